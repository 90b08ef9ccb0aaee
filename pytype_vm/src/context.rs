//! Shared analysis state.

use crate::config::Options;
use crate::errors::{ErrorKind, ErrorLog, Position};
use crate::heap::{ClassId, FunctionId, Heap};
use crate::load_abstract::{load_builtins, Builtins};
use crate::overlays;
use crate::values::Value;
use indexmap::IndexMap;

/// Everything one analysis run shares: options, the object heap, recorded
/// findings and the builtins module.
#[derive(Debug)]
pub struct Context {
    pub options: Options,
    pub heap: Heap,
    pub errorlog: ErrorLog,
    pub builtins: Builtins,
    call_stack: Vec<FunctionId>,
    position: Position,
}

impl Context {
    pub fn new(options: Options) -> Self {
        overlays::initialize();
        let mut heap = Heap::default();
        let builtins = load_builtins(&mut heap);
        Self {
            options,
            heap,
            errorlog: ErrorLog::default(),
            builtins,
            call_stack: Vec::new(),
            position: Position::default(),
        }
    }

    /// Globals a module starts with.
    pub fn get_module_globals(&self) -> IndexMap<String, Value> {
        self.builtins.module_globals()
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    /// Record a finding at the current position.
    pub fn record_error(&mut self, kind: ErrorKind) {
        let position = self.position.clone();
        self.errorlog.record(kind, position);
    }

    pub fn call_depth(&self) -> usize {
        self.call_stack.len()
    }

    /// Whether `function` is currently executing.
    pub fn is_active(&self, function: FunctionId) -> bool {
        self.call_stack.contains(&function)
    }

    pub(crate) fn push_call(&mut self, function: FunctionId) {
        self.call_stack.push(function);
    }

    pub(crate) fn pop_call(&mut self) {
        self.call_stack.pop();
    }

    /// Class of a value, where one is known.
    pub fn class_of(&self, value: &Value) -> Option<ClassId> {
        match value {
            Value::Constant(c) => Some(self.builtins.class_of_constant(c)),
            Value::FrozenInstance(cls) => Some(*cls),
            Value::Instance(id) => Some(self.heap.instance(*id).cls),
            Value::Class(cls) => Some(self.heap.class(*cls).metaclass.unwrap_or(self.builtins.type_)),
            Value::Function(_) | Value::BoundFunction(_) => Some(self.builtins.function),
            Value::Tuple(_) | Value::FunctionArgTuple(_) => Some(self.builtins.tuple),
            Value::List(_) => Some(self.builtins.list),
            Value::Dict(_) | Value::FunctionArgDict(_) => Some(self.builtins.dict),
            Value::Any | Value::Null | Value::Union(_) => None,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Options::default())
    }
}
