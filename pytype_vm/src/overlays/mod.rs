//! Hand-written approximations of library functions.
//!
//! The loader asks [`lookup`] for every declared function; a registered
//! builder replaces the plain declaration.

mod special_builtins;

use crate::values::PytdFunction;
use once_cell::sync::OnceCell;
use std::collections::HashMap;

/// Builds the declaration of `module.name`.
pub type FunctionBuilder = fn(module: &str, name: &str) -> PytdFunction;

type Registry = HashMap<(String, String), FunctionBuilder>;

static REGISTRY: OnceCell<Registry> = OnceCell::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let mut registry = Registry::new();
        special_builtins::register(&mut registry);
        registry
    })
}

/// Populate the registry. Later calls are no-ops.
pub fn initialize() {
    registry();
}

/// The builder registered for `module.name`.
pub fn lookup(module: &str, name: &str) -> Option<FunctionBuilder> {
    registry()
        .get(&(module.to_string(), name.to_string()))
        .copied()
}
