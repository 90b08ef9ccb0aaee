use super::base::{BoundFunction, Value};
use crate::flow::Variable;
use crate::heap::{ClassId, FunctionId, Heap};
use indexmap::IndexMap;

/// Where a class came from.
#[derive(Clone, Debug, PartialEq)]
pub enum ClassKind {
    /// Declared by the loader.
    Simple,
    /// Built from a `class` statement or a `type(...)` call.
    Interpreter {
        keywords: IndexMap<String, Value>,
        /// Interpreter functions among the members, in definition order.
        functions: Vec<FunctionId>,
        /// Classes defined in the body.
        classes: Vec<ClassId>,
    },
}

/// A class stored in the heap.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassData {
    pub name: String,
    pub module: Option<String>,
    pub bases: Vec<ClassId>,
    pub members: IndexMap<String, Value>,
    pub metaclass: Option<ClassId>,
    pub kind: ClassKind,
}

impl ClassData {
    /// A declared class.
    pub fn simple(module: &str, name: &str, bases: Vec<ClassId>) -> Self {
        Self {
            name: name.to_string(),
            module: Some(module.to_string()),
            bases,
            members: IndexMap::new(),
            metaclass: None,
            kind: ClassKind::Simple,
        }
    }

    /// A class built during analysis.
    pub fn interpreter(
        name: &str,
        bases: Vec<ClassId>,
        members: IndexMap<String, Value>,
        keywords: IndexMap<String, Value>,
        metaclass: Option<ClassId>,
        functions: Vec<FunctionId>,
        classes: Vec<ClassId>,
    ) -> Self {
        Self {
            name: name.to_string(),
            module: None,
            bases,
            members,
            metaclass,
            kind: ClassKind::Interpreter {
                keywords,
                functions,
                classes,
            },
        }
    }

    /// `module.name` for declared classes, the bare name otherwise.
    pub fn full_name(&self) -> String {
        match &self.module {
            Some(module) => format!("{}.{}", module, self.name),
            None => self.name.clone(),
        }
    }

    pub fn is_interpreter(&self) -> bool {
        matches!(self.kind, ClassKind::Interpreter { .. })
    }

    pub fn keywords(&self) -> Option<&IndexMap<String, Value>> {
        match &self.kind {
            ClassKind::Interpreter { keywords, .. } => Some(keywords),
            ClassKind::Simple => None,
        }
    }

    pub fn functions(&self) -> &[FunctionId] {
        match &self.kind {
            ClassKind::Interpreter { functions, .. } => functions,
            ClassKind::Simple => &[],
        }
    }

    pub fn classes(&self) -> &[ClassId] {
        match &self.kind {
            ClassKind::Interpreter { classes, .. } => classes,
            ClassKind::Simple => &[],
        }
    }
}

/// An instance with its own attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceData {
    pub cls: ClassId,
    pub members: IndexMap<String, Variable>,
}

/// Metaclass of a class being built: the `metaclass` keyword when it names
/// a class, otherwise the first base that has one.
pub fn resolve_metaclass(
    heap: &Heap,
    keywords: &IndexMap<String, Value>,
    bases: &[ClassId],
) -> Option<ClassId> {
    if let Some(Value::Class(meta)) = keywords.get("metaclass") {
        return Some(*meta);
    }
    bases.iter().find_map(|base| heap.class(*base).metaclass)
}

impl Heap {
    /// Method resolution order, depth-first and left to right, without
    /// repeats.
    pub fn mro(&self, cls: ClassId) -> Vec<ClassId> {
        let mut order = Vec::new();
        let mut pending = vec![cls];
        while let Some(next) = pending.pop() {
            if order.contains(&next) {
                continue;
            }
            order.push(next);
            for base in self.class(next).bases.iter().rev() {
                pending.push(*base);
            }
        }
        order
    }

    /// Look `name` up on a class and its bases.
    pub fn lookup_class_attribute(&self, cls: ClassId, name: &str) -> Option<Value> {
        self.mro(cls)
            .into_iter()
            .find_map(|c| self.class(c).members.get(name).cloned())
    }

    /// Whether attribute lookups on `cls` may hit members nobody declared.
    ///
    /// True when some class in the hierarchy other than `object` came from
    /// the loader, whose member lists are partial.
    pub fn has_opaque_ancestry(&self, cls: ClassId, object: ClassId) -> bool {
        self.mro(cls)
            .into_iter()
            .any(|c| c != object && !self.class(c).is_interpreter())
    }

    /// A fresh instance of `cls`. Interpreter classes get a mutable
    /// instance, declared classes a frozen one.
    pub fn instantiate(&mut self, cls: ClassId) -> Value {
        if self.class(cls).is_interpreter() {
            Value::Instance(self.add_instance(InstanceData {
                cls,
                members: IndexMap::new(),
            }))
        } else {
            Value::FrozenInstance(cls)
        }
    }

    /// Attach a function defined in the body of `cls`.
    pub fn add_class_function(&mut self, cls: ClassId, function: FunctionId) {
        if let ClassKind::Interpreter { functions, .. } = &mut self.class_mut(cls).kind {
            if !functions.contains(&function) {
                functions.push(function);
            }
        }
    }
}

/// Bind a function to a receiver.
pub fn bind_to(function: FunctionId, receiver: Value) -> Value {
    Value::BoundFunction(BoundFunction::new(receiver, function))
}
