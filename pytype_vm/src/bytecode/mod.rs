//! Block-structured bytecode.
//!
//! Code objects arrive already split into basic blocks; jump operands name
//! blocks rather than byte offsets.

mod builder;
mod code;
mod opcode;
mod provider;

pub use builder::{class_body, CodeBuilder};
pub use code::{Block, ConstValue, Instruction, OrderedCode};
pub use opcode::{make_function_flags, Opcode, CALL_EX_HAS_KWARGS};
pub use provider::{BytecodeProvider, JsonCodeProvider};
