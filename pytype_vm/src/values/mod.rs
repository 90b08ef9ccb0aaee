//! The abstract value lattice.
//!
//! `Any` is the top element; [`join_values`] computes least upper bounds by
//! collecting distinct values into a flat `Union`.

mod base;
mod classes;
mod constant;
mod containers;
mod functions;
mod utils;

pub use base::{BoundFunction, Union, Value, ValueKind};
pub use classes::{bind_to, resolve_metaclass, ClassData, ClassKind, InstanceData};
pub use constant::Constant;
pub use containers::{Dict, FunctionArgDict, FunctionArgTuple, List, Tuple};
pub use functions::{
    ArgError, Args, FunctionData, InterpreterFunction, MappedArgs, OverlayCall, PytdFunction,
    Signature, SpecialBehavior,
};
pub use utils::{get_atomic_constant, join_values, FromConstant, ShapeMismatch};
