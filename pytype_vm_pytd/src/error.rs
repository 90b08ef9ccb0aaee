//! Declaration error types

use thiserror::Error;

/// Errors raised while assembling a declaration unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PytdError {
    /// Two class definitions with the same name
    #[error("duplicate top-level class '{name}'")]
    DuplicateClass { name: String },

    /// A name used by two different kinds of definition
    #[error("'{name}' is defined both as a {first} and as a {second}")]
    NameConflict {
        name: String,
        first: &'static str,
        second: &'static str,
    },
}
