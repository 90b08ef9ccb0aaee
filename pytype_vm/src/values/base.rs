use super::constant::Constant;
use super::containers::{Dict, FunctionArgDict, FunctionArgTuple, List, Tuple};
use crate::flow::Variable;
use crate::heap::{ClassId, FunctionId, Heap, InstanceId};

/// An abstract value.
///
/// Classes, functions and instances live in the [`Heap`] and are referenced
/// by id, so two values naming the same id are the same object.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Top element: any value at all.
    Any,
    /// The marker pushed below a callable that has no receiver.
    Null,
    Constant(Constant),
    Union(Union),
    Class(ClassId),
    Function(FunctionId),
    BoundFunction(BoundFunction),
    Instance(InstanceId),
    /// Some instance of a class, with no per-instance state.
    FrozenInstance(ClassId),
    Tuple(Tuple),
    List(List),
    Dict(Dict),
    FunctionArgTuple(FunctionArgTuple),
    FunctionArgDict(FunctionArgDict),
}

/// Discriminant of [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Any,
    Null,
    Constant,
    Union,
    Class,
    Function,
    BoundFunction,
    Instance,
    FrozenInstance,
    Tuple,
    List,
    Dict,
    FunctionArgTuple,
    FunctionArgDict,
}

impl ValueKind {
    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Any => "Any",
            ValueKind::Null => "NULL",
            ValueKind::Constant => "constant",
            ValueKind::Union => "Union",
            ValueKind::Class => "class",
            ValueKind::Function => "function",
            ValueKind::BoundFunction => "bound method",
            ValueKind::Instance => "instance",
            ValueKind::FrozenInstance => "frozen instance",
            ValueKind::Tuple => "tuple",
            ValueKind::List => "list",
            ValueKind::Dict => "dict",
            ValueKind::FunctionArgTuple => "FunctionArgTuple",
            ValueKind::FunctionArgDict => "FunctionArgDict",
        }
    }
}

/// A function together with the object it was looked up on.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundFunction {
    pub receiver: Box<Value>,
    pub function: FunctionId,
}

impl BoundFunction {
    pub fn new(receiver: Value, function: FunctionId) -> Self {
        Self {
            receiver: Box::new(receiver),
            function,
        }
    }
}

/// Two or more distinct values, never nested.
///
/// Built only by [`super::join_values`].
#[derive(Clone, Debug, PartialEq)]
pub struct Union {
    members: Vec<Value>,
}

impl Union {
    pub(super) fn from_flat(members: Vec<Value>) -> Self {
        debug_assert!(members.len() >= 2);
        Self { members }
    }

    pub fn members(&self) -> &[Value] {
        &self.members
    }
}

impl Value {
    pub fn constant(value: impl Into<Constant>) -> Value {
        Value::Constant(value.into())
    }

    pub fn none() -> Value {
        Value::Constant(Constant::None)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Any => ValueKind::Any,
            Value::Null => ValueKind::Null,
            Value::Constant(_) => ValueKind::Constant,
            Value::Union(_) => ValueKind::Union,
            Value::Class(_) => ValueKind::Class,
            Value::Function(_) => ValueKind::Function,
            Value::BoundFunction(_) => ValueKind::BoundFunction,
            Value::Instance(_) => ValueKind::Instance,
            Value::FrozenInstance(_) => ValueKind::FrozenInstance,
            Value::Tuple(_) => ValueKind::Tuple,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
            Value::FunctionArgTuple(_) => ValueKind::FunctionArgTuple,
            Value::FunctionArgDict(_) => ValueKind::FunctionArgDict,
        }
    }

    /// Short description used in error messages. Literals report their
    /// Python type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Constant(c) => c.type_name(),
            other => other.kind().name(),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Value::Any)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_class(&self) -> Option<ClassId> {
        match self {
            Value::Class(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<FunctionId> {
        match self {
            Value::Function(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Constant> {
        match self {
            Value::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Wrap in a single-binding variable.
    pub fn to_variable(self) -> Variable {
        Variable::from_value(self)
    }

    /// Qualified name of classes and functions.
    pub fn full_name(&self, heap: &Heap) -> Option<String> {
        match self {
            Value::Class(id) => Some(heap.class(*id).full_name()),
            Value::Function(id) => Some(heap.function(*id).full_name()),
            Value::BoundFunction(bound) => Some(heap.function(bound.function).full_name()),
            _ => None,
        }
    }

    /// Human readable rendering for diagnostics.
    pub fn repr(&self, heap: &Heap) -> String {
        match self {
            Value::Any => "Any".to_string(),
            Value::Null => "NULL".to_string(),
            Value::Constant(c) => c.to_string(),
            Value::Union(u) => {
                let parts: Vec<String> = u.members().iter().map(|m| m.repr(heap)).collect();
                format!("Union[{}]", parts.join(", "))
            }
            Value::Class(id) => format!("<class {}>", heap.class(*id).full_name()),
            Value::Function(id) => format!("<function {}>", heap.function(*id).full_name()),
            Value::BoundFunction(bound) => {
                format!("<bound method {}>", heap.function(bound.function).full_name())
            }
            Value::Instance(id) => {
                let cls = heap.instance(*id).cls;
                format!("<{} instance>", heap.class(cls).full_name())
            }
            Value::FrozenInstance(cls) => format!("<{} instance>", heap.class(*cls).full_name()),
            Value::Tuple(_) => "tuple".to_string(),
            Value::List(_) => "list".to_string(),
            Value::Dict(_) => "dict".to_string(),
            Value::FunctionArgTuple(_) => "*args".to_string(),
            Value::FunctionArgDict(_) => "**kwargs".to_string(),
        }
    }
}
