use serde::{Deserialize, Serialize};
use std::fmt;

/// `MAKE_FUNCTION` operand bits.
pub mod make_function_flags {
    pub const DEFAULTS: u8 = 0x01;
    pub const KW_DEFAULTS: u8 = 0x02;
    pub const ANNOTATIONS: u8 = 0x04;
    pub const CLOSURE: u8 = 0x08;
}

/// `CALL_FUNCTION_EX` operand bit: a keyword mapping is on the stack.
pub const CALL_EX_HAS_KWARGS: u8 = 0x01;

/// A Python 3.11 instruction.
///
/// Jump operands are block indices within the enclosing code object, name
/// operands are resolved names, and `LOAD_CONST` / `KW_NAMES` operands index
/// the code object's constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
    // no-ops
    Nop,
    Resume,
    Precall,
    Cache,

    // stack manipulation
    PushNull,
    PopTop,
    Copy(usize),
    Swap(usize),

    // constants and names
    LoadConst(usize),
    LoadName(String),
    StoreName(String),
    DeleteName(String),
    /// `push_null` mirrors the low bit of the 3.11 operand.
    LoadGlobal {
        name: String,
        #[serde(default)]
        push_null: bool,
    },
    StoreGlobal(String),
    LoadFast(String),
    StoreFast(String),
    DeleteFast(String),

    // closures
    MakeCell(String),
    LoadClosure(String),
    LoadDeref(String),
    StoreDeref(String),
    CopyFreeVars(usize),

    // attributes
    LoadAttr(String),
    StoreAttr(String),
    LoadMethod(String),
    LoadBuildClass,

    // containers
    BuildTuple(usize),
    BuildList(usize),
    BuildMap(usize),
    BuildConstKeyMap(usize),
    ListAppend(usize),
    ListExtend(usize),
    ListToTuple,
    DictMerge(usize),
    DictUpdate(usize),

    // functions and calls
    MakeFunction(u8),
    KwNames(usize),
    Call(usize),
    CallFunctionEx(u8),
    ReturnValue,

    // operators
    BinaryOp(String),
    CompareOp(String),
    IsOp(bool),
    ContainsOp(bool),
    UnaryNot,
    UnaryNegative,

    // control flow
    GetIter,
    ForIter(usize),
    JumpForward(usize),
    JumpBackward(usize),
    PopJumpIfFalse(usize),
    PopJumpIfTrue(usize),
    PopJumpIfNone(usize),
    PopJumpIfNotNone(usize),
    RaiseVarargs(usize),

    // imports
    ImportName(String),
    ImportFrom(String),
}

impl Opcode {
    /// The CPython opcode name.
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Nop => "NOP",
            Opcode::Resume => "RESUME",
            Opcode::Precall => "PRECALL",
            Opcode::Cache => "CACHE",
            Opcode::PushNull => "PUSH_NULL",
            Opcode::PopTop => "POP_TOP",
            Opcode::Copy(_) => "COPY",
            Opcode::Swap(_) => "SWAP",
            Opcode::LoadConst(_) => "LOAD_CONST",
            Opcode::LoadName(_) => "LOAD_NAME",
            Opcode::StoreName(_) => "STORE_NAME",
            Opcode::DeleteName(_) => "DELETE_NAME",
            Opcode::LoadGlobal { .. } => "LOAD_GLOBAL",
            Opcode::StoreGlobal(_) => "STORE_GLOBAL",
            Opcode::LoadFast(_) => "LOAD_FAST",
            Opcode::StoreFast(_) => "STORE_FAST",
            Opcode::DeleteFast(_) => "DELETE_FAST",
            Opcode::MakeCell(_) => "MAKE_CELL",
            Opcode::LoadClosure(_) => "LOAD_CLOSURE",
            Opcode::LoadDeref(_) => "LOAD_DEREF",
            Opcode::StoreDeref(_) => "STORE_DEREF",
            Opcode::CopyFreeVars(_) => "COPY_FREE_VARS",
            Opcode::LoadAttr(_) => "LOAD_ATTR",
            Opcode::StoreAttr(_) => "STORE_ATTR",
            Opcode::LoadMethod(_) => "LOAD_METHOD",
            Opcode::LoadBuildClass => "LOAD_BUILD_CLASS",
            Opcode::BuildTuple(_) => "BUILD_TUPLE",
            Opcode::BuildList(_) => "BUILD_LIST",
            Opcode::BuildMap(_) => "BUILD_MAP",
            Opcode::BuildConstKeyMap(_) => "BUILD_CONST_KEY_MAP",
            Opcode::ListAppend(_) => "LIST_APPEND",
            Opcode::ListExtend(_) => "LIST_EXTEND",
            Opcode::ListToTuple => "LIST_TO_TUPLE",
            Opcode::DictMerge(_) => "DICT_MERGE",
            Opcode::DictUpdate(_) => "DICT_UPDATE",
            Opcode::MakeFunction(_) => "MAKE_FUNCTION",
            Opcode::KwNames(_) => "KW_NAMES",
            Opcode::Call(_) => "CALL",
            Opcode::CallFunctionEx(_) => "CALL_FUNCTION_EX",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::BinaryOp(_) => "BINARY_OP",
            Opcode::CompareOp(_) => "COMPARE_OP",
            Opcode::IsOp(_) => "IS_OP",
            Opcode::ContainsOp(_) => "CONTAINS_OP",
            Opcode::UnaryNot => "UNARY_NOT",
            Opcode::UnaryNegative => "UNARY_NEGATIVE",
            Opcode::GetIter => "GET_ITER",
            Opcode::ForIter(_) => "FOR_ITER",
            Opcode::JumpForward(_) => "JUMP_FORWARD",
            Opcode::JumpBackward(_) => "JUMP_BACKWARD",
            Opcode::PopJumpIfFalse(_) => "POP_JUMP_IF_FALSE",
            Opcode::PopJumpIfTrue(_) => "POP_JUMP_IF_TRUE",
            Opcode::PopJumpIfNone(_) => "POP_JUMP_IF_NONE",
            Opcode::PopJumpIfNotNone(_) => "POP_JUMP_IF_NOT_NONE",
            Opcode::RaiseVarargs(_) => "RAISE_VARARGS",
            Opcode::ImportName(_) => "IMPORT_NAME",
            Opcode::ImportFrom(_) => "IMPORT_FROM",
        }
    }

    /// Jump target, for instructions that may transfer control.
    pub fn jump_target(&self) -> Option<usize> {
        match self {
            Opcode::ForIter(target)
            | Opcode::JumpForward(target)
            | Opcode::JumpBackward(target)
            | Opcode::PopJumpIfFalse(target)
            | Opcode::PopJumpIfTrue(target)
            | Opcode::PopJumpIfNone(target)
            | Opcode::PopJumpIfNotNone(target) => Some(*target),
            _ => None,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_form() {
        let ops: Vec<Opcode> = serde_json::from_str(
            r#"["RESUME", {"LOAD_CONST": 0}, {"LOAD_GLOBAL": {"name": "len", "push_null": true}}, "RETURN_VALUE"]"#,
        )
        .unwrap();
        assert_eq!(
            ops,
            vec![
                Opcode::Resume,
                Opcode::LoadConst(0),
                Opcode::LoadGlobal {
                    name: "len".into(),
                    push_null: true
                },
                Opcode::ReturnValue,
            ]
        );
    }

    #[test]
    fn test_jump_target() {
        assert_eq!(Opcode::PopJumpIfFalse(3).jump_target(), Some(3));
        assert_eq!(Opcode::Call(0).jump_target(), None);
        assert_eq!(Opcode::KwNames(1).to_string(), "KW_NAMES");
    }
}
