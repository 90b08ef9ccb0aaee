use super::code::OrderedCode;
use crate::config::PythonVersion;
use crate::error::CompileError;
use std::path::Path;

/// Source of compiled code objects.
pub trait BytecodeProvider {
    /// Compile `src` into a block-structured code object.
    ///
    /// `python_exe` names an interpreter for providers that compile by
    /// running one; `filename` is recorded on the result.
    fn compile(
        &self,
        src: &str,
        python_version: PythonVersion,
        python_exe: Option<&Path>,
        filename: Option<&str>,
    ) -> Result<OrderedCode, CompileError>;
}

/// Reads code objects already serialized as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodeProvider;

impl BytecodeProvider for JsonCodeProvider {
    fn compile(
        &self,
        src: &str,
        python_version: PythonVersion,
        _python_exe: Option<&Path>,
        filename: Option<&str>,
    ) -> Result<OrderedCode, CompileError> {
        let mut code: OrderedCode =
            serde_json::from_str(src).map_err(|e| CompileError::Json(e.to_string()))?;
        if let Some(found) = code.python_version {
            if found != python_version {
                return Err(CompileError::VersionMismatch {
                    expected: python_version,
                    found,
                });
            }
        }
        if let Some(filename) = filename {
            if code.filename.is_empty() {
                code.filename = filename.to_string();
            }
        }
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{ConstValue, Opcode};

    const MODULE: &str = r#"{
        "name": "<module>",
        "python_version": "3.11",
        "consts": [{"Int": 1}, "None"],
        "blocks": [[
            {"opcode": {"LOAD_CONST": 0}, "line": 1},
            {"opcode": {"STORE_NAME": "x"}, "line": 1},
            {"opcode": {"LOAD_CONST": 1}, "line": 1},
            {"opcode": "RETURN_VALUE", "line": 1}
        ]]
    }"#;

    #[test]
    fn test_json_provider_reads_code() {
        let code = JsonCodeProvider
            .compile(MODULE, PythonVersion(3, 11), None, Some("m.py"))
            .unwrap();
        assert_eq!(code.name, "<module>");
        assert_eq!(code.filename, "m.py");
        assert_eq!(code.consts, vec![ConstValue::Int(1), ConstValue::None]);
        assert_eq!(
            code.blocks[0].instructions[1].opcode,
            Opcode::StoreName("x".into())
        );
    }

    #[test]
    fn test_json_provider_checks_version() {
        let err = JsonCodeProvider
            .compile(MODULE, PythonVersion(3, 12), None, None)
            .unwrap_err();
        assert_eq!(
            err,
            CompileError::VersionMismatch {
                expected: PythonVersion(3, 12),
                found: PythonVersion(3, 11),
            }
        );
    }

    #[test]
    fn test_json_provider_rejects_garbage() {
        let err = JsonCodeProvider
            .compile("{", PythonVersion(3, 11), None, None)
            .unwrap_err();
        assert!(matches!(err, CompileError::Json(_)));
    }
}
