use super::opcode::Opcode;
use crate::config::PythonVersion;
use crate::error::{AnalysisError, AnalysisResult};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A single instruction with its source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    #[serde(default)]
    pub line: u32,
}

impl Instruction {
    pub fn new(opcode: Opcode, line: u32) -> Self {
        Self { opcode, line }
    }
}

/// A straight-line run of instructions. Control enters only at the top.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block {
    pub instructions: Vec<Instruction>,
}

/// Entry of a code object's constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
    Tuple(Vec<ConstValue>),
    Code(Rc<OrderedCode>),
}

/// A compiled code object whose instructions are grouped into blocks.
///
/// `varnames` starts with the positional parameters, followed by the
/// keyword-only parameters, the `*args` name and the `**kwargs` name when
/// present, then the remaining locals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedCode {
    pub name: String,
    #[serde(default)]
    pub qualname: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub first_line: u32,
    #[serde(default)]
    pub python_version: Option<PythonVersion>,
    #[serde(default)]
    pub argcount: usize,
    #[serde(default)]
    pub posonlyargcount: usize,
    #[serde(default)]
    pub kwonlyargcount: usize,
    #[serde(default)]
    pub varargs: bool,
    #[serde(default)]
    pub varkeywords: bool,
    #[serde(default)]
    pub varnames: Vec<String>,
    #[serde(default)]
    pub consts: Vec<ConstValue>,
    pub blocks: Vec<Block>,
}

impl OrderedCode {
    /// The qualified name, falling back to the plain name.
    pub fn qualname(&self) -> &str {
        if self.qualname.is_empty() {
            &self.name
        } else {
            &self.qualname
        }
    }

    /// Names of positional parameters, positional-only ones first.
    pub fn positional_params(&self) -> &[String] {
        let end = self.argcount.min(self.varnames.len());
        &self.varnames[..end]
    }

    /// Names of keyword-only parameters.
    pub fn kwonly_params(&self) -> &[String] {
        let start = self.argcount.min(self.varnames.len());
        let end = (self.argcount + self.kwonlyargcount).min(self.varnames.len());
        &self.varnames[start..end]
    }

    /// Name of the `*args` parameter.
    pub fn varargs_name(&self) -> Option<&str> {
        if !self.varargs {
            return None;
        }
        self.varnames
            .get(self.argcount + self.kwonlyargcount)
            .map(String::as_str)
    }

    /// Name of the `**kwargs` parameter.
    pub fn varkeywords_name(&self) -> Option<&str> {
        if !self.varkeywords {
            return None;
        }
        let index = self.argcount + self.kwonlyargcount + usize::from(self.varargs);
        self.varnames.get(index).map(String::as_str)
    }

    pub fn const_at(&self, index: usize) -> AnalysisResult<&ConstValue> {
        self.consts.get(index).ok_or_else(|| {
            AnalysisError::Unhandled(format!(
                "constant index {} out of range in {}",
                index,
                self.qualname()
            ))
        })
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instructions.len()).sum()
    }
}
