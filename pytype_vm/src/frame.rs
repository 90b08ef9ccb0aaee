//! The instruction interpreter.
//!
//! A frame executes one code object over abstract values. Blocks run in
//! order; a jump or fallthrough merges the current state into the target
//! block's entry state, and a block nobody reaches is skipped. Backward
//! edges are not followed, so loop bodies are analyzed once.

use crate::bytecode::{make_function_flags, Opcode, OrderedCode, CALL_EX_HAS_KWARGS};
use crate::calls;
use crate::context::Context;
use crate::error::{AnalysisError, AnalysisResult};
use crate::errors::{ErrorKind, Position};
use crate::flow::{BlockState, Origin, Variable};
use crate::function_call_helper::FunctionCallHelper;
use crate::heap::{ClassId, FunctionId};
use crate::values::{
    get_atomic_constant, Args, Constant, Dict, FromConstant, FunctionData, InterpreterFunction,
    List, Signature, SpecialBehavior, Tuple, Value,
};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, debug_span, trace};

/// A mutable name table shared between frames.
pub type Scope = Rc<RefCell<IndexMap<String, Variable>>>;

pub fn new_scope(names: IndexMap<String, Variable>) -> Scope {
    Rc::new(RefCell::new(names))
}

/// The scopes a frame exposes to code it creates or calls.
#[derive(Clone, Debug)]
pub struct FrameRef {
    pub name: Rc<str>,
    pub globals: Scope,
    /// Cell scopes of enclosing frames, outermost first.
    pub enclosing: Vec<Scope>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Stores to names also update the globals.
    Module,
    Function,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Next,
    Stop,
}

#[derive(Debug)]
pub struct Frame {
    name: Rc<str>,
    kind: FrameKind,
    code: Rc<OrderedCode>,
    function: Option<FunctionId>,
    globals: Scope,
    enclosing: Vec<Scope>,
    cells: Scope,
    helper: FunctionCallHelper,
    initial_locals: IndexMap<String, Variable>,
    /// Entry states of blocks not yet executed, by block index.
    pending: BTreeMap<usize, BlockState>,
    state: BlockState,
    block: usize,
    line: u32,
    functions: Vec<FunctionId>,
    classes: Vec<ClassId>,
    final_locals: IndexMap<String, Variable>,
    returns: Vec<Variable>,
    finished: bool,
}

impl Frame {
    /// Frame for a module body. `globals` seed both the locals and the
    /// global scope.
    pub fn module(code: Rc<OrderedCode>, globals: IndexMap<String, Variable>) -> Self {
        let name: Rc<str> = Rc::from(code.qualname());
        let scope = new_scope(globals.clone());
        Self::build(name, FrameKind::Module, code, None, scope, Vec::new(), globals)
    }

    /// Module frame seeded with the globals every module starts with.
    pub fn make_module_frame(ctx: &Context, code: Rc<OrderedCode>) -> Self {
        let globals = ctx
            .get_module_globals()
            .into_iter()
            .map(|(name, value)| (name, value.to_variable()))
            .collect();
        Self::module(code, globals)
    }

    /// Frame for a call of `function` with parameters already bound.
    pub fn function(
        id: FunctionId,
        function: &InterpreterFunction,
        locals: IndexMap<String, Variable>,
    ) -> Self {
        Self::build(
            Rc::from(function.qualname.as_str()),
            FrameKind::Function,
            Rc::clone(&function.code),
            Some(id),
            Rc::clone(&function.enclosing.globals),
            function.enclosing.enclosing.clone(),
            locals,
        )
    }

    fn build(
        name: Rc<str>,
        kind: FrameKind,
        code: Rc<OrderedCode>,
        function: Option<FunctionId>,
        globals: Scope,
        enclosing: Vec<Scope>,
        initial_locals: IndexMap<String, Variable>,
    ) -> Self {
        let cells = new_scope(IndexMap::new());
        let mut visible = enclosing.clone();
        visible.push(Rc::clone(&cells));
        let helper = FunctionCallHelper::new(FrameRef {
            name: Rc::clone(&name),
            globals: Rc::clone(&globals),
            enclosing: visible,
        });
        Self {
            name,
            kind,
            code,
            function,
            globals,
            enclosing,
            cells,
            helper,
            initial_locals,
            pending: BTreeMap::new(),
            state: BlockState::default(),
            block: 0,
            line: 0,
            functions: Vec::new(),
            classes: Vec::new(),
            final_locals: IndexMap::new(),
            returns: Vec::new(),
            finished: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn code(&self) -> &OrderedCode {
        &self.code
    }

    /// The function this frame is running, if it is not a module frame.
    pub fn function_id(&self) -> Option<FunctionId> {
        self.function
    }

    pub fn initial_locals(&self) -> &IndexMap<String, Variable> {
        &self.initial_locals
    }

    /// Locals at every return point, merged.
    pub fn final_locals(&self) -> &IndexMap<String, Variable> {
        &self.final_locals
    }

    /// Functions created while this frame ran, in creation order.
    pub fn functions(&self) -> &[FunctionId] {
        &self.functions
    }

    /// Classes built by `class` statements in this frame.
    pub fn classes(&self) -> &[ClassId] {
        &self.classes
    }

    /// Merged return values, `None` when no path reached a return.
    pub fn return_variable(&self) -> Option<Variable> {
        (!self.returns.is_empty()).then(|| Variable::merge(&self.returns))
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The scopes code created in this frame can see.
    pub fn frame_ref(&self) -> &FrameRef {
        self.helper.frame()
    }

    pub fn run(&mut self, ctx: &mut Context) -> AnalysisResult<()> {
        if self.finished {
            return Err(AnalysisError::InternalConsistency(format!(
                "frame {} has already run",
                self.name
            )));
        }
        let span = debug_span!("frame", code = %self.name);
        let _enter = span.enter();

        let code = Rc::clone(&self.code);
        self.pending
            .insert(0, BlockState::new(self.initial_locals.clone()));
        for (index, block) in code.blocks.iter().enumerate() {
            let Some(state) = self.pending.remove(&index) else {
                trace!(block = index, "skipping unreachable block");
                continue;
            };
            self.block = index;
            self.state = state;

            let mut flow = Flow::Next;
            for instruction in &block.instructions {
                self.line = instruction.line;
                self.sync_position(ctx);
                trace!(
                    opcode = %instruction.opcode,
                    line = instruction.line,
                    depth = self.state.stack.len()
                );
                flow = self.step(ctx, &instruction.opcode)?;
                if flow == Flow::Stop {
                    break;
                }
            }
            if flow == Flow::Next && index + 1 < code.blocks.len() {
                self.jump(index + 1)?;
            }
        }
        self.finished = true;
        debug!(
            functions = self.functions.len(),
            classes = self.classes.len(),
            "frame finished"
        );
        Ok(())
    }

    fn sync_position(&self, ctx: &mut Context) {
        ctx.set_position(Position {
            code: Rc::clone(&self.name),
            line: self.line,
        });
    }

    fn step(&mut self, ctx: &mut Context, op: &Opcode) -> AnalysisResult<Flow> {
        match op {
            Opcode::Nop | Opcode::Resume | Opcode::Precall | Opcode::Cache => {}
            Opcode::CopyFreeVars(_) => {}

            Opcode::PushNull => self.push_value(Value::Null),
            Opcode::PopTop => {
                self.pop(op)?;
            }
            Opcode::Copy(depth) => {
                let var = self.peek(*depth, op)?.clone();
                self.push(var);
            }
            Opcode::Swap(depth) => {
                let top = self.stack_index(1, op)?;
                let other = self.stack_index(*depth, op)?;
                self.state.stack.swap(top, other);
            }

            Opcode::LoadConst(index) => {
                let constant = Constant::from(self.code.const_at(*index)?);
                self.push_value(Value::Constant(constant));
            }
            Opcode::LoadName(name) => {
                let var = self.load_name(ctx, name);
                self.push(var);
            }
            Opcode::StoreName(name) | Opcode::StoreFast(name) => {
                let var = self.pop(op)?;
                self.store_local(name, var);
            }
            Opcode::DeleteName(name) | Opcode::DeleteFast(name) => {
                self.state.locals.shift_remove(name);
                if self.kind == FrameKind::Module {
                    self.globals.borrow_mut().shift_remove(name);
                }
            }
            Opcode::LoadGlobal { name, push_null } => {
                if *push_null {
                    self.push_value(Value::Null);
                }
                let var = self.load_global(ctx, name);
                self.push(var);
            }
            Opcode::StoreGlobal(name) => {
                let var = self.pop(op)?;
                if self.kind == FrameKind::Module {
                    self.state.locals.insert(name.clone(), var.clone());
                }
                self.globals.borrow_mut().insert(name.clone(), var);
            }
            Opcode::LoadFast(name) => {
                let var = match self.state.locals.get(name) {
                    Some(var) => var.clone(),
                    None => {
                        ctx.record_error(ErrorKind::NameError(name.clone()));
                        Value::Any.to_variable()
                    }
                };
                self.push(var);
            }

            Opcode::MakeCell(name) => {
                if let Some(var) = self.state.locals.get(name) {
                    self.cells.borrow_mut().insert(name.clone(), var.clone());
                }
            }
            Opcode::LoadClosure(name) => {
                let var = self.cells.borrow().get(name).cloned();
                self.push(var.unwrap_or_else(|| Value::Any.to_variable()));
            }
            Opcode::LoadDeref(name) => {
                let var = self.load_deref(ctx, name);
                self.push(var);
            }
            Opcode::StoreDeref(name) => {
                let var = self.pop(op)?;
                self.cells.borrow_mut().insert(name.clone(), var);
            }

            Opcode::LoadAttr(name) => {
                let obj = self.pop(op)?;
                let var = self.load_attribute(ctx, &obj, name);
                self.push(var);
            }
            Opcode::LoadMethod(name) => {
                let obj = self.pop(op)?;
                let var = self.load_attribute(ctx, &obj, name);
                self.push_value(Value::Null);
                self.push(var);
            }
            Opcode::StoreAttr(name) => {
                let obj = self.pop(op)?;
                let value = self.pop(op)?;
                calls::set_attribute(ctx, &obj, name, value);
            }
            Opcode::LoadBuildClass => {
                let value = ctx.builtins.lookup("__build_class__").cloned().ok_or_else(|| {
                    AnalysisError::InternalConsistency("builtins lack __build_class__".into())
                })?;
                self.push_value(value);
            }

            Opcode::BuildTuple(count) => {
                let elements = self.pop_n(*count, op)?;
                self.push_value(Value::Tuple(Tuple::new(elements)));
            }
            Opcode::BuildList(count) => {
                let elements = self.pop_n(*count, op)?;
                self.push_value(Value::List(List::new(elements)));
            }
            Opcode::BuildMap(count) => {
                let items = self.pop_n(count * 2, op)?;
                let mut entries = Vec::with_capacity(*count);
                let mut items = items.into_iter();
                while let (Some(key), Some(value)) = (items.next(), items.next()) {
                    entries.push((key, value));
                }
                self.push_value(Value::Dict(Dict::new(entries)));
            }
            Opcode::BuildConstKeyMap(count) => {
                let keys = self.pop(op)?;
                let values = self.pop_n(*count, op)?;
                let keys = match get_atomic_constant::<Constant>(&keys)? {
                    Constant::Tuple(keys) if keys.len() == *count => keys,
                    other => {
                        return Err(AnalysisError::type_mismatch(
                            format!("tuple of {} keys", count),
                            other.type_name(),
                        ))
                    }
                };
                let entries = keys
                    .into_iter()
                    .map(|key| Value::Constant(key).to_variable())
                    .zip(values)
                    .collect();
                self.push_value(Value::Dict(Dict::new(entries)));
            }
            Opcode::ListAppend(depth) => {
                let item = self.pop(op)?;
                let index = self.stack_index(*depth, op)?;
                let list = match self.state.stack[index].get_atomic_value() {
                    Ok(Value::List(list)) => match list.elements() {
                        Some(elements) => {
                            let mut elements = elements.to_vec();
                            elements.push(item);
                            List::new(elements)
                        }
                        None => List::indefinite(),
                    },
                    _ => List::indefinite(),
                };
                self.state.stack[index] = Value::List(list).to_variable();
            }
            Opcode::ListExtend(depth) => {
                let iterable = self.pop(op)?;
                let index = self.stack_index(*depth, op)?;
                let list = match (
                    self.state.stack[index].get_atomic_value(),
                    concrete_elements(&iterable),
                ) {
                    (Ok(Value::List(list)), Some(extra)) => match list.elements() {
                        Some(elements) => {
                            let mut elements = elements.to_vec();
                            elements.extend(extra);
                            List::new(elements)
                        }
                        None => List::indefinite(),
                    },
                    _ => List::indefinite(),
                };
                self.state.stack[index] = Value::List(list).to_variable();
            }
            Opcode::ListToTuple => {
                let list = self.pop(op)?;
                let tuple = match concrete_elements(&list) {
                    Some(elements) => Tuple::new(elements),
                    None => Tuple::indefinite(),
                };
                self.push_value(Value::Tuple(tuple));
            }
            Opcode::DictMerge(depth) | Opcode::DictUpdate(depth) => {
                let mapping = self.pop(op)?;
                let index = self.stack_index(*depth, op)?;
                let dict = match (
                    self.state.stack[index].get_atomic_value(),
                    mapping.get_atomic_value(),
                ) {
                    (Ok(Value::Dict(target)), Ok(Value::Dict(source))) => {
                        match (target.entries(), source.entries()) {
                            (Some(a), Some(b)) => {
                                Dict::new(a.iter().chain(b).cloned().collect())
                            }
                            _ => Dict::indefinite(),
                        }
                    }
                    _ => Dict::indefinite(),
                };
                self.state.stack[index] = Value::Dict(dict).to_variable();
            }

            Opcode::MakeFunction(flags) => {
                let value = self.make_function(ctx, *flags, op)?;
                self.push_value(value);
            }
            Opcode::KwNames(index) => {
                let constant = Constant::from(self.code.const_at(*index)?);
                let names = Vec::<String>::from_constant(&constant)?;
                self.helper.set_kw_names(names)?;
            }
            Opcode::Call(argc) => {
                let args = self.pop_n(*argc, op)?;
                let second = self.pop(op)?;
                let first = self.pop(op)?;
                let (callable, args) = if first.has_atomic_value(&Value::Null) {
                    (second, args)
                } else {
                    let mut with_receiver = Vec::with_capacity(args.len() + 1);
                    with_receiver.push(second);
                    with_receiver.extend(args);
                    (first, with_receiver)
                };
                let args = self.helper.make_function_args(args)?;
                let result = self.call(ctx, &callable, args)?;
                self.push(result);
            }
            Opcode::CallFunctionEx(flags) => {
                let kwargs = if flags & CALL_EX_HAS_KWARGS != 0 {
                    Some(self.pop(op)?)
                } else {
                    None
                };
                let starargs = self.pop(op)?;
                let callable = self.pop(op)?;
                if self
                    .state
                    .stack
                    .last()
                    .is_some_and(|v| v.has_atomic_value(&Value::Null))
                {
                    self.state.stack.pop();
                }
                let args = self.helper.make_function_args_ex(starargs, kwargs)?;
                let result = self.call(ctx, &callable, args)?;
                self.push(result);
            }
            Opcode::ReturnValue => {
                let var = self.pop(op)?;
                self.returns.push(var);
                for (name, var) in &self.state.locals {
                    match self.final_locals.get_mut(name) {
                        Some(existing) => existing.merge_from(var),
                        None => {
                            self.final_locals.insert(name.clone(), var.clone());
                        }
                    }
                }
                return Ok(Flow::Stop);
            }

            Opcode::BinaryOp(_) => {
                let rhs = self.pop(op)?;
                let lhs = self.pop(op)?;
                let mut results = Vec::new();
                for l in lhs.values() {
                    for r in rhs.values() {
                        results.push(binary_result(ctx, l, r));
                    }
                }
                self.push(Variable::from_values(results));
            }
            Opcode::CompareOp(_) | Opcode::IsOp(_) | Opcode::ContainsOp(_) => {
                self.pop_n(2, op)?;
                self.push_value(Value::FrozenInstance(ctx.builtins.bool_));
            }
            Opcode::UnaryNot => {
                self.pop(op)?;
                self.push_value(Value::FrozenInstance(ctx.builtins.bool_));
            }
            Opcode::UnaryNegative => {
                let operand = self.pop(op)?;
                let results: Vec<Value> = operand
                    .values()
                    .map(|v| match numeric_rank(ctx, v) {
                        Some((_, cls)) => Value::FrozenInstance(cls),
                        None => Value::Any,
                    })
                    .collect();
                self.push(Variable::from_values(results));
            }

            Opcode::GetIter => {
                self.pop(op)?;
                self.push_value(Value::Any);
            }
            Opcode::ForIter(target) => {
                let mut exhausted = self.state.clone();
                if exhausted.stack.pop().is_none() {
                    return Err(self.underflow(op));
                }
                self.merge_into(*target, exhausted)?;
                self.push_value(Value::Any);
            }
            Opcode::JumpForward(target) | Opcode::JumpBackward(target) => {
                self.jump(*target)?;
                return Ok(Flow::Stop);
            }
            Opcode::PopJumpIfFalse(target)
            | Opcode::PopJumpIfTrue(target)
            | Opcode::PopJumpIfNone(target)
            | Opcode::PopJumpIfNotNone(target) => {
                self.pop(op)?;
                self.jump(*target)?;
            }
            Opcode::RaiseVarargs(count) => {
                self.pop_n(*count, op)?;
                return Ok(Flow::Stop);
            }

            Opcode::ImportName(_) => {
                self.pop_n(2, op)?;
                self.push_value(Value::Any);
            }
            Opcode::ImportFrom(_) => {
                self.peek(1, op)?;
                self.push_value(Value::Any);
            }
        }
        Ok(Flow::Next)
    }

    // --- stack ---

    fn push(&mut self, var: Variable) {
        self.state.stack.push(var);
    }

    fn push_value(&mut self, value: Value) {
        let var = Variable::from_value_at(value, Origin::Line(self.line));
        self.push(var);
    }

    fn underflow(&self, op: &Opcode) -> AnalysisError {
        AnalysisError::StackUnderflow {
            code: self.name.to_string(),
            opcode: op.name().to_string(),
        }
    }

    fn pop(&mut self, op: &Opcode) -> AnalysisResult<Variable> {
        self.state.stack.pop().ok_or_else(|| self.underflow(op))
    }

    /// Pop `count` entries, returned bottom first.
    fn pop_n(&mut self, count: usize, op: &Opcode) -> AnalysisResult<Vec<Variable>> {
        let len = self.state.stack.len();
        if count > len {
            return Err(self.underflow(op));
        }
        Ok(self.state.stack.split_off(len - count))
    }

    /// Index of the entry `depth` slots from the top, the top being 1.
    fn stack_index(&self, depth: usize, op: &Opcode) -> AnalysisResult<usize> {
        let len = self.state.stack.len();
        if depth == 0 || depth > len {
            return Err(self.underflow(op));
        }
        Ok(len - depth)
    }

    fn peek(&self, depth: usize, op: &Opcode) -> AnalysisResult<&Variable> {
        let index = self.stack_index(depth, op)?;
        Ok(&self.state.stack[index])
    }

    // --- control flow ---

    fn jump(&mut self, target: usize) -> AnalysisResult<()> {
        let state = self.state.clone();
        self.merge_into(target, state)
    }

    fn merge_into(&mut self, target: usize, state: BlockState) -> AnalysisResult<()> {
        if target <= self.block {
            trace!(from = self.block, to = target, "ignoring backward edge");
            return Ok(());
        }
        if target >= self.code.blocks.len() {
            return Err(AnalysisError::Unhandled(format!(
                "jump to block {} in {}, which has {} blocks",
                target,
                self.name,
                self.code.blocks.len()
            )));
        }
        match self.pending.entry(target) {
            Entry::Occupied(mut entry) => entry.get_mut().merge(state),
            Entry::Vacant(entry) => {
                entry.insert(state);
                Ok(())
            }
        }
    }

    // --- names ---

    fn store_local(&mut self, name: &str, var: Variable) {
        if self.kind == FrameKind::Module {
            self.globals
                .borrow_mut()
                .insert(name.to_string(), var.clone());
        }
        self.state.locals.insert(name.to_string(), var);
    }

    fn load_name(&mut self, ctx: &mut Context, name: &str) -> Variable {
        match self.state.locals.get(name) {
            Some(var) => var.clone(),
            None => self.load_global(ctx, name),
        }
    }

    fn load_global(&mut self, ctx: &mut Context, name: &str) -> Variable {
        if let Some(var) = self.globals.borrow().get(name).cloned() {
            return var;
        }
        if let Some(value) = ctx.builtins.lookup(name) {
            return value.clone().to_variable();
        }
        ctx.record_error(ErrorKind::NameError(name.to_string()));
        Value::Any.to_variable()
    }

    fn load_deref(&mut self, ctx: &mut Context, name: &str) -> Variable {
        if let Some(var) = self.cells.borrow().get(name).cloned() {
            return var;
        }
        for scope in self.enclosing.iter().rev() {
            if let Some(var) = scope.borrow().get(name).cloned() {
                return var;
            }
        }
        ctx.record_error(ErrorKind::NameError(name.to_string()));
        Value::Any.to_variable()
    }

    // --- attributes and calls ---

    fn load_attribute(&mut self, ctx: &mut Context, obj: &Variable, name: &str) -> Variable {
        let mut values = Vec::new();
        for value in obj.values() {
            match calls::get_attribute(ctx, value, name) {
                Some(var) => values.extend(var.values().cloned()),
                None => {
                    let object = value.repr(&ctx.heap);
                    ctx.record_error(ErrorKind::AttributeError(object, name.to_string()));
                    values.push(Value::Any);
                }
            }
        }
        Variable::from_values(values)
    }

    fn call(&mut self, ctx: &mut Context, callable: &Variable, args: Args) -> AnalysisResult<Variable> {
        let builds_class = callable.values().any(|value| {
            matches!(value, Value::Function(id)
                if matches!(ctx.heap.function(*id).special(), Some(SpecialBehavior::BuildClass)))
        });
        let result = calls::call_function(ctx, callable, args)?;
        self.sync_position(ctx);
        if builds_class {
            for value in result.values() {
                if let Value::Class(cls) = value {
                    if !self.classes.contains(cls) {
                        self.classes.push(*cls);
                    }
                }
            }
        }
        Ok(result)
    }

    fn make_function(&mut self, ctx: &mut Context, flags: u8, op: &Opcode) -> AnalysisResult<Value> {
        let code = self.pop(op)?;
        if flags & make_function_flags::CLOSURE != 0 {
            self.pop(op)?;
        }
        if flags & make_function_flags::ANNOTATIONS != 0 {
            self.pop(op)?;
        }
        let kw_defaults = if flags & make_function_flags::KW_DEFAULTS != 0 {
            let var = self.pop(op)?;
            keyword_defaults(&var)?
        } else {
            IndexMap::new()
        };
        let defaults = if flags & make_function_flags::DEFAULTS != 0 {
            let var = self.pop(op)?;
            positional_defaults(&var)?
        } else {
            Vec::new()
        };

        let code = match code.get_atomic_value()? {
            Value::Constant(Constant::Code(code)) => Rc::clone(code),
            other => return Err(AnalysisError::type_mismatch("code", other.type_name())),
        };
        let signature = Signature::from_code(&code, defaults, kw_defaults);
        let function = InterpreterFunction {
            name: code.name.clone(),
            qualname: code.qualname().to_string(),
            code,
            signature,
            enclosing: self.frame_ref().clone(),
        };
        debug!(function = %function.qualname, "discovered function");
        let id = ctx.heap.add_function(FunctionData::Interpreter(function));
        self.functions.push(id);
        Ok(Value::Function(id))
    }
}

/// Elements of a tuple or list whose contents are known.
fn concrete_elements(var: &Variable) -> Option<Vec<Variable>> {
    match var.get_atomic_value().ok()? {
        Value::Tuple(tuple) => tuple.elements().map(<[Variable]>::to_vec),
        Value::List(list) => list.elements().map(<[Variable]>::to_vec),
        Value::Constant(Constant::Tuple(items)) => Some(
            items
                .iter()
                .map(|c| Value::Constant(c.clone()).to_variable())
                .collect(),
        ),
        _ => None,
    }
}

fn positional_defaults(var: &Variable) -> AnalysisResult<Vec<Variable>> {
    match var.get_atomic_value()? {
        Value::Tuple(tuple) if tuple.is_indefinite() => Ok(Vec::new()),
        Value::Tuple(_) | Value::Constant(Constant::Tuple(_)) => {
            Ok(concrete_elements(var).unwrap_or_default())
        }
        other => Err(AnalysisError::type_mismatch("tuple", other.type_name())),
    }
}

fn keyword_defaults(var: &Variable) -> AnalysisResult<IndexMap<String, Variable>> {
    match var.get_atomic_value()? {
        Value::Dict(dict) => Ok(dict
            .to_function_arg_dict()?
            .into_entries()
            .unwrap_or_default()),
        other => Err(AnalysisError::type_mismatch("dict", other.type_name())),
    }
}

/// Promotion rank and class of a numeric value.
fn numeric_rank(ctx: &Context, value: &Value) -> Option<(u8, ClassId)> {
    let b = &ctx.builtins;
    let cls = match value {
        Value::Constant(c) => b.class_of_constant(c),
        Value::FrozenInstance(cls) => *cls,
        _ => return None,
    };
    if cls == b.bool_ || cls == b.int {
        Some((0, b.int))
    } else if cls == b.float {
        Some((1, b.float))
    } else if cls == b.complex {
        Some((2, b.complex))
    } else {
        None
    }
}

/// Result of a binary operator on two builtin operands: numbers promote,
/// sequences of one class stay that class, anything else is `Any`.
fn binary_result(ctx: &Context, lhs: &Value, rhs: &Value) -> Value {
    if let (Some((l_rank, l_cls)), Some((r_rank, r_cls))) =
        (numeric_rank(ctx, lhs), numeric_rank(ctx, rhs))
    {
        return Value::FrozenInstance(if l_rank >= r_rank { l_cls } else { r_cls });
    }
    let b = &ctx.builtins;
    match (ctx.class_of(lhs), ctx.class_of(rhs)) {
        (Some(l), Some(r)) if l == r && [b.str_, b.bytes, b.list, b.tuple].contains(&l) => {
            Value::FrozenInstance(l)
        }
        _ => Value::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CodeBuilder, ConstValue};
    use pretty_assertions::assert_eq;

    fn run_module(ctx: &mut Context, code: OrderedCode) -> AnalysisResult<Frame> {
        let mut frame = Frame::make_module_frame(ctx, Rc::new(code));
        frame.run(ctx)?;
        Ok(frame)
    }

    #[test]
    fn test_store_and_return() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module()
            .load_const(ConstValue::Int(1))
            .op(Opcode::StoreName("x".into()))
            .return_none()
            .build();
        let frame = run_module(&mut ctx, code).unwrap();
        assert!(frame.final_locals()["x"].has_atomic_value(&Value::constant(1i64)));
        assert!(frame
            .return_variable()
            .unwrap()
            .has_atomic_value(&Value::none()));
        assert!(frame.globals.borrow().contains_key("x"));
    }

    #[test]
    fn test_branches_merge() {
        // x = 1 if cond else "a"
        let mut ctx = Context::default();
        let code = CodeBuilder::module()
            .op(Opcode::LoadName("__name__".into()))
            .op(Opcode::PopJumpIfFalse(2))
            .load_const(ConstValue::Int(1))
            .op(Opcode::StoreName("x".into()))
            .op(Opcode::JumpForward(3))
            .new_block()
            .op(Opcode::Nop)
            .new_block()
            .load_const(ConstValue::Str("a".into()))
            .op(Opcode::StoreName("x".into()))
            .new_block()
            .return_none()
            .build();
        let frame = run_module(&mut ctx, code).unwrap();
        let x: Vec<&Value> = frame.final_locals()["x"].values().collect();
        assert_eq!(x, vec![&Value::constant(1i64), &Value::constant("a")]);
    }

    #[test]
    fn test_unreachable_block_is_skipped() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module()
            .return_none()
            .new_block()
            .op(Opcode::LoadName("undefined".into()))
            .return_none()
            .build();
        run_module(&mut ctx, code).unwrap();
        assert!(ctx.errorlog.is_empty());
    }

    #[test]
    fn test_undefined_name_is_any_and_logged() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module()
            .line(4)
            .op(Opcode::LoadName("missing".into()))
            .op(Opcode::StoreName("y".into()))
            .return_none()
            .build();
        let frame = run_module(&mut ctx, code).unwrap();
        assert!(frame.final_locals()["y"].has_atomic_value(&Value::Any));
        let diagnostic = &ctx.errorlog.diagnostics()[0];
        assert_eq!(diagnostic.kind, ErrorKind::NameError("missing".into()));
        assert_eq!(diagnostic.position.line, 4);
    }

    #[test]
    fn test_stack_underflow() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module().op(Opcode::PopTop).build();
        let err = run_module(&mut ctx, code).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::StackUnderflow {
                code: "<module>".into(),
                opcode: "POP_TOP".into()
            }
        );
    }

    #[test]
    fn test_stack_mismatch_at_merge() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module()
            .load_const(ConstValue::Int(1))
            .op(Opcode::PopJumpIfTrue(2))
            .new_block()
            .load_const(ConstValue::Int(2))
            .new_block()
            .return_none()
            .build();
        let err = run_module(&mut ctx, code).unwrap_err();
        assert!(matches!(err, AnalysisError::InternalConsistency(_)));
    }

    #[test]
    fn test_frame_runs_once() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module().return_none().build();
        let mut frame = run_module(&mut ctx, code).unwrap();
        assert!(matches!(
            frame.run(&mut ctx),
            Err(AnalysisError::InternalConsistency(_))
        ));
    }

    #[test]
    fn test_raising_frame_has_no_return() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module().op(Opcode::RaiseVarargs(0)).build();
        let frame = run_module(&mut ctx, code).unwrap();
        assert!(frame.is_finished());
        assert!(frame.return_variable().is_none());
        assert!(frame.final_locals().is_empty());
    }

    #[test]
    fn test_binary_op_promotes_numbers() {
        let mut ctx = Context::default();
        let code = CodeBuilder::module()
            .load_const(ConstValue::Int(1))
            .load_const(ConstValue::Float(2.0))
            .op(Opcode::BinaryOp("+".into()))
            .op(Opcode::StoreName("x".into()))
            .load_const(ConstValue::Str("a".into()))
            .load_const(ConstValue::Str("b".into()))
            .op(Opcode::BinaryOp("+".into()))
            .op(Opcode::StoreName("y".into()))
            .load_const(ConstValue::Str("a".into()))
            .load_const(ConstValue::Int(2))
            .op(Opcode::BinaryOp("*".into()))
            .op(Opcode::StoreName("z".into()))
            .return_none()
            .build();
        let frame = run_module(&mut ctx, code).unwrap();
        let locals = frame.final_locals();
        assert!(locals["x"].has_atomic_value(&Value::FrozenInstance(ctx.builtins.float)));
        assert!(locals["y"].has_atomic_value(&Value::FrozenInstance(ctx.builtins.str_)));
        assert!(locals["z"].has_atomic_value(&Value::Any));
    }

    #[test]
    fn test_build_const_key_map() {
        let mut ctx = Context::default();
        let keys = ConstValue::Tuple(vec![ConstValue::Str("a".into()), ConstValue::Str("b".into())]);
        let code = CodeBuilder::module()
            .load_const(ConstValue::Int(1))
            .load_const(ConstValue::Int(2))
            .load_const(keys)
            .op(Opcode::BuildConstKeyMap(2))
            .op(Opcode::StoreName("d".into()))
            .return_none()
            .build();
        let frame = run_module(&mut ctx, code).unwrap();
        let Value::Dict(dict) = frame.final_locals()["d"].get_atomic_value().unwrap() else {
            panic!("expected a dict");
        };
        let entries = dict.to_function_arg_dict().unwrap().into_entries().unwrap();
        assert_eq!(entries["b"], Value::constant(2i64).to_variable());
    }

    #[test]
    fn test_closure_reads_enclosing_cell() {
        // def outer():
        //     x = 1
        //     def inner(): return x
        //     return inner()
        let mut ctx = Context::default();
        let inner = CodeBuilder::function("inner")
            .qualname("outer.<locals>.inner")
            .op(Opcode::CopyFreeVars(1))
            .op(Opcode::LoadDeref("x".into()))
            .op(Opcode::ReturnValue)
            .build();
        let outer = CodeBuilder::function("outer")
            .load_const(ConstValue::Int(1))
            .op(Opcode::StoreFast("x".into()))
            .op(Opcode::MakeCell("x".into()))
            .op(Opcode::LoadClosure("x".into()))
            .op(Opcode::BuildTuple(1))
            .load_const(ConstValue::Code(Rc::new(inner)))
            .op(Opcode::MakeFunction(make_function_flags::CLOSURE))
            .op(Opcode::StoreFast("inner".into()))
            .op(Opcode::PushNull)
            .op(Opcode::LoadFast("inner".into()))
            .op(Opcode::Call(0))
            .op(Opcode::ReturnValue)
            .build();
        let code = CodeBuilder::module()
            .def_function(outer, "outer")
            .op(Opcode::PushNull)
            .op(Opcode::LoadName("outer".into()))
            .op(Opcode::Call(0))
            .op(Opcode::StoreName("r".into()))
            .return_none()
            .build();
        let frame = run_module(&mut ctx, code).unwrap();
        assert!(frame.final_locals()["r"].has_atomic_value(&Value::constant(1i64)));
        assert!(ctx.errorlog.is_empty(), "{}", ctx.errorlog);
    }
}
