//! Assembling code objects by hand.
//!
//! Used by tests and by callers that produce instruction streams without a
//! Python toolchain.
//!
//! ```
//! use pytype_vm::bytecode::{CodeBuilder, ConstValue, Opcode};
//!
//! // def f(): return 1
//! let f = CodeBuilder::function("f")
//!     .load_const(ConstValue::Int(1))
//!     .op(Opcode::ReturnValue)
//!     .build();
//! let module = CodeBuilder::module()
//!     .def_function(f, "f")
//!     .return_none()
//!     .build();
//! assert_eq!(module.blocks.len(), 1);
//! ```

use super::code::{Block, ConstValue, Instruction, OrderedCode};
use super::opcode::Opcode;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct CodeBuilder {
    name: String,
    qualname: String,
    filename: String,
    positional: Vec<String>,
    posonly_count: usize,
    kwonly: Vec<String>,
    varargs: Option<String>,
    varkeywords: Option<String>,
    consts: Vec<ConstValue>,
    blocks: Vec<Block>,
    current: Vec<Instruction>,
    line: u32,
}

impl CodeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            qualname: name.to_string(),
            filename: "<test>".to_string(),
            positional: Vec::new(),
            posonly_count: 0,
            kwonly: Vec::new(),
            varargs: None,
            varkeywords: None,
            consts: Vec::new(),
            blocks: Vec::new(),
            current: Vec::new(),
            line: 1,
        }
    }

    pub fn module() -> Self {
        Self::new("<module>")
    }

    pub fn function(name: &str) -> Self {
        Self::new(name)
    }

    pub fn qualname(mut self, qualname: &str) -> Self {
        self.qualname = qualname.to_string();
        self
    }

    /// Add positional parameters.
    pub fn params(mut self, names: &[&str]) -> Self {
        self.positional.extend(names.iter().map(|n| n.to_string()));
        self
    }

    /// Mark the first `count` positional parameters as positional-only.
    pub fn posonly(mut self, count: usize) -> Self {
        self.posonly_count = count;
        self
    }

    pub fn kwonly(mut self, names: &[&str]) -> Self {
        self.kwonly.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn varargs(mut self, name: &str) -> Self {
        self.varargs = Some(name.to_string());
        self
    }

    pub fn varkeywords(mut self, name: &str) -> Self {
        self.varkeywords = Some(name.to_string());
        self
    }

    /// Set the line attached to subsequent instructions.
    pub fn line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn op(mut self, opcode: Opcode) -> Self {
        self.current.push(Instruction::new(opcode, self.line));
        self
    }

    /// Intern a constant and return its index.
    pub fn add_const(&mut self, value: ConstValue) -> usize {
        if let Some(index) = self.consts.iter().position(|c| *c == value) {
            return index;
        }
        self.consts.push(value);
        self.consts.len() - 1
    }

    pub fn load_const(mut self, value: ConstValue) -> Self {
        let index = self.add_const(value);
        self.op(Opcode::LoadConst(index))
    }

    pub fn kw_names(mut self, names: &[&str]) -> Self {
        let tuple = ConstValue::Tuple(names.iter().map(|n| ConstValue::Str(n.to_string())).collect());
        let index = self.add_const(tuple);
        self.op(Opcode::KwNames(index))
    }

    /// Close the current block and start a new one.
    pub fn new_block(mut self) -> Self {
        let instructions = std::mem::take(&mut self.current);
        self.blocks.push(Block { instructions });
        self
    }

    /// Index the next block will have once the current one is closed.
    pub fn next_block_index(&self) -> usize {
        self.blocks.len() + 1
    }

    /// `name = <function from code>`
    pub fn def_function(self, code: OrderedCode, name: &str) -> Self {
        self.load_const(ConstValue::Code(Rc::new(code)))
            .op(Opcode::MakeFunction(0))
            .op(Opcode::StoreName(name.to_string()))
    }

    /// `class name(*bases): <body>` with bases loaded by name.
    pub fn def_class(self, body: OrderedCode, name: &str, bases: &[&str]) -> Self {
        let mut builder = self
            .op(Opcode::PushNull)
            .op(Opcode::LoadBuildClass)
            .load_const(ConstValue::Code(Rc::new(body)))
            .op(Opcode::MakeFunction(0))
            .load_const(ConstValue::Str(name.to_string()));
        for base in bases {
            builder = builder.op(Opcode::LoadName(base.to_string()));
        }
        builder
            .op(Opcode::Call(2 + bases.len()))
            .op(Opcode::StoreName(name.to_string()))
    }

    pub fn return_none(self) -> Self {
        self.load_const(ConstValue::None).op(Opcode::ReturnValue)
    }

    pub fn build(mut self) -> OrderedCode {
        if !self.current.is_empty() || self.blocks.is_empty() {
            self = self.new_block();
        }
        let argcount = self.positional.len();
        let kwonlyargcount = self.kwonly.len();
        let varargs = self.varargs.is_some();
        let varkeywords = self.varkeywords.is_some();
        let mut varnames = self.positional;
        varnames.extend(self.kwonly);
        varnames.extend(self.varargs);
        varnames.extend(self.varkeywords);
        OrderedCode {
            name: self.name,
            qualname: self.qualname,
            filename: self.filename,
            first_line: 1,
            python_version: None,
            argcount,
            posonlyargcount: self.posonly_count.min(argcount),
            kwonlyargcount,
            varargs,
            varkeywords,
            varnames,
            consts: self.consts,
            blocks: self.blocks,
        }
    }
}

/// Body of `class name: ...` storing the usual `__module__` and
/// `__qualname__` entries before the given instructions run.
pub fn class_body(name: &str) -> CodeBuilder {
    CodeBuilder::function(name)
        .op(Opcode::LoadName("__name__".to_string()))
        .op(Opcode::StoreName("__module__".to_string()))
        .load_const(ConstValue::Str(name.to_string()))
        .op(Opcode::StoreName("__qualname__".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varnames_layout() {
        let code = CodeBuilder::function("f")
            .varkeywords("kw")
            .varargs("args")
            .kwonly(&["c"])
            .params(&["a", "b"])
            .posonly(1)
            .return_none()
            .build();
        assert_eq!(code.varnames, vec!["a", "b", "c", "args", "kw"]);
        assert_eq!(code.positional_params(), ["a", "b"]);
        assert_eq!(code.kwonly_params(), ["c"]);
        assert_eq!(code.varargs_name(), Some("args"));
        assert_eq!(code.varkeywords_name(), Some("kw"));
        assert_eq!(code.posonlyargcount, 1);
    }

    #[test]
    fn test_constants_are_interned() {
        let code = CodeBuilder::module()
            .load_const(ConstValue::Int(1))
            .load_const(ConstValue::Int(1))
            .return_none()
            .build();
        assert_eq!(code.consts, vec![ConstValue::Int(1), ConstValue::None]);
        assert_eq!(code.instruction_count(), 4);
    }

    #[test]
    fn test_blocks() {
        let builder = CodeBuilder::module().op(Opcode::Nop);
        assert_eq!(builder.next_block_index(), 1);
        let code = builder.new_block().return_none().build();
        assert_eq!(code.blocks.len(), 2);
    }
}
