//! Recoverable analysis findings.
//!
//! Problems in the analyzed program do not stop the analysis: the offending
//! expression evaluates to `Any` and a [`Diagnostic`] is recorded in the
//! context's [`ErrorLog`].
//!
//! # Usage
//!
//! - `ErrorLog::record()` - add a finding at a position
//! - `ErrorLog::diagnostics()` - inspect findings in recording order
//! - `ErrorLog::take()` - retrieve and clear collected findings

use std::fmt;
use std::rc::Rc;
use tracing::warn;

/// A location in the analyzed program.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    /// Qualified name of the code object.
    pub code: Rc<str>,
    pub line: u32,
}

impl Position {
    pub fn new(code: &str, line: u32) -> Self {
        Self {
            code: Rc::from(code),
            line,
        }
    }
}

/// What went wrong.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    /// A name that is not bound anywhere.
    NameError(String),

    /// Attribute lookup failed. Contains (object, attribute).
    AttributeError(String, String),

    /// A value that cannot be called was called.
    NotCallable(String),

    /// Arguments do not fit the callee's signature.
    /// Contains (function, problem).
    WrongArgCount(String, String),

    /// `assert_type` disagreed. Contains (expected, actual).
    AssertType(String, String),

    /// `reveal_type` output. Contains the printed type.
    RevealType(String),
}

impl ErrorKind {
    /// Short identifier of the finding.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::NameError(_) => "name-error",
            ErrorKind::AttributeError(..) => "attribute-error",
            ErrorKind::NotCallable(_) => "not-callable",
            ErrorKind::WrongArgCount(..) => "wrong-arg-count",
            ErrorKind::AssertType(..) => "assert-type",
            ErrorKind::RevealType(_) => "reveal-type",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::NameError(name) => write!(f, "name '{}' is not defined", name),
            ErrorKind::AttributeError(object, attr) => {
                write!(f, "no attribute '{}' on {}", attr, object)
            }
            ErrorKind::NotCallable(object) => write!(f, "{} is not callable", object),
            ErrorKind::WrongArgCount(function, problem) => {
                write!(f, "invalid call to {}: {}", function, problem)
            }
            ErrorKind::AssertType(expected, actual) => {
                write!(f, "expected type {}, got {}", expected, actual)
            }
            ErrorKind::RevealType(ty) => f.write_str(ty),
        }
    }
}

/// A recorded finding.
#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub position: Position,
}

impl Diagnostic {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {} [{}]",
            self.position.code,
            self.position.line,
            self.kind,
            self.kind.name()
        )
    }
}

/// Collects findings in the order they were recorded. A finding identical
/// to one already recorded is dropped, so re-analyzing a body does not
/// report it twice.
#[derive(Clone, Debug, Default)]
pub struct ErrorLog {
    diagnostics: Vec<Diagnostic>,
}

impl ErrorLog {
    pub fn record(&mut self, kind: ErrorKind, position: Position) {
        let diagnostic = Diagnostic { kind, position };
        if self.diagnostics.contains(&diagnostic) {
            return;
        }
        warn!(
            code = %diagnostic.position.code,
            line = diagnostic.position.line,
            kind = diagnostic.name(),
            "{}",
            diagnostic.kind
        );
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Whether a finding with this short identifier was recorded.
    pub fn has(&self, name: &str) -> bool {
        self.diagnostics.iter().any(|d| d.name() == name)
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

impl fmt::Display for ErrorLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}
