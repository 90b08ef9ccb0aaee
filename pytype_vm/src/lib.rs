// Prevent accidental debug output in library code.
// The CLI binary may use eprintln!() for user-facing error messages.
#![deny(clippy::print_stderr)]

//! Type inference for Python bytecode by abstract interpretation.
//!
//! The analyzer executes a compiled instruction stream over approximate
//! values, merges them at control-flow joins, and re-runs function and
//! method bodies to infer their signatures.
//!
//! # Module structure
//!
//! - `bytecode`: the instruction stream data model and providers
//! - `values`: the abstract value lattice
//! - `flow`: variables and per-block state
//! - `heap`: arena storage for classes, functions, instances and frames
//! - `frame`: the instruction interpreter
//! - `function_call_helper`: call argument normalization and class building
//! - `calls`: call dispatch and attribute lookup
//! - `load_abstract`: the builtins module
//! - `overlays`: hand-written approximations of library functions
//! - `convert`: exporting values as type declarations
//! - `vm`: the analysis scheduler

// Core modules
pub mod api;
pub mod bytecode;
pub mod calls;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod errors;
pub mod flow;
pub mod frame;
pub mod function_call_helper;
pub mod heap;
pub mod load_abstract;
pub mod overlays;
pub mod values;
pub mod vm;

pub use api::{check_types, infer_types, infer_types_from_json};
pub use config::{Options, PythonVersion};
pub use context::Context;
pub use error::{AnalysisError, AnalysisResult};
pub use vm::VirtualMachine;
