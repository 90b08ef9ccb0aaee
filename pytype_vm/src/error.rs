//! Fatal analysis errors.
//!
//! Any of these aborts the enclosing analysis run. Recoverable findings
//! (undefined names, bad call arity, failed `assert_type`) are recorded in
//! [`crate::errors::ErrorLog`] instead.

use crate::config::PythonVersion;
use pytype_vm_pytd::PytdError;
use thiserror::Error;

/// Analysis error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// A variable expected to hold exactly one value holds several
    #[error("expected exactly one value, got {count}")]
    NotAtomic { count: usize },

    /// A value does not have the expected shape
    #[error("expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    /// Malformed input the analyzer cannot approximate
    #[error("unhandled input: {0}")]
    Unhandled(String),

    /// A caller broke an internal protocol
    #[error("internal consistency violation: {0}")]
    InternalConsistency(String),

    /// An instruction popped more operands than the stack holds
    #[error("stack underflow in {code} at {opcode}")]
    StackUnderflow { code: String, opcode: String },

    /// The bytecode provider failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// The declaration unit could not be assembled
    #[error(transparent)]
    Pytd(#[from] PytdError),
}

impl AnalysisError {
    pub(crate) fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        AnalysisError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Bytecode provider error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    /// The serialized code could not be parsed
    #[error("invalid code object: {0}")]
    Json(String),

    /// The code was compiled for another interpreter version
    #[error("code compiled for python {found}, expected {expected}")]
    VersionMismatch {
        expected: PythonVersion,
        found: PythonVersion,
    },

    /// Reading the input failed
    #[error("cannot read '{path}': {message}")]
    Io { path: String, message: String },
}

/// Configuration error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("cannot read config '{path}': {message}")]
    Io { path: String, message: String },

    #[error("invalid config: {0}")]
    Toml(String),
}
