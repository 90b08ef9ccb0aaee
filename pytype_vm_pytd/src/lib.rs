//! Type declaration nodes for pytype_vm.
//!
//! This crate holds the exported form of inferred types: a [`TypeDeclUnit`]
//! collects the constants, functions and classes of one module, and the
//! [`printer`] renders it as `.pyi` stub text.
//!
//! # Module structure
//!
//! - `nodes`: declaration and type nodes
//! - `unit`: building a unit from loose definitions
//! - `printer`: stub text rendering
//! - `error`: error types

pub mod error;
pub mod nodes;
pub mod printer;
pub mod unit;

pub use error::PytdError;
pub use nodes::{
    Class, Constant, Definition, Function, Parameter, ParameterKind, Signature, Type,
    TypeDeclUnit,
};
pub use printer::{print_type, print_unit};
pub use unit::wrap_type_decl_unit;
