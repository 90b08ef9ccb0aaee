//! Declaration nodes.
//!
//! Types are referenced by fully qualified name (`builtins.int`,
//! `typing.Any`); the printer decides how to abbreviate them.

use serde::{Deserialize, Serialize};

/// Fully qualified name of the `None` type.
pub const NONE_TYPE: &str = "builtins.NoneType";

/// A type expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    /// `Any`: no information.
    Anything,
    /// The empty type (`NoReturn`).
    Nothing,
    /// A class referenced by its fully qualified name.
    Class(String),
    /// A parameterized class, e.g. `builtins.dict[str, int]`.
    Generic { base: String, parameters: Vec<Type> },
    /// `Callable[..., R]`
    Callable(Box<Type>),
    /// Union of two or more types, never nested.
    Union(Vec<Type>),
}

impl Type {
    /// Shorthand for a class type.
    pub fn class(name: impl Into<String>) -> Self {
        Type::Class(name.into())
    }

    /// Shorthand for a `builtins` class type.
    pub fn builtin(name: &str) -> Self {
        Type::Class(format!("builtins.{}", name))
    }

    /// The `None` type.
    pub fn none() -> Self {
        Type::Class(NONE_TYPE.to_string())
    }

    /// Join types into a single type.
    ///
    /// Nested unions are flattened and duplicates removed. `Any` absorbs
    /// everything, no input gives `Nothing`, one distinct input is returned
    /// bare.
    pub fn union(types: impl IntoIterator<Item = Type>) -> Self {
        let mut members: Vec<Type> = Vec::new();
        for ty in types {
            let flat = match ty {
                Type::Union(inner) => inner,
                Type::Nothing => continue,
                other => vec![other],
            };
            for member in flat {
                if member == Type::Anything {
                    return Type::Anything;
                }
                if !members.contains(&member) {
                    members.push(member);
                }
            }
        }
        match members.len() {
            0 => Type::Nothing,
            1 => members.remove(0),
            _ => Type::Union(members),
        }
    }
}

/// `name: type` at module or class level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constant {
    pub name: String,
    pub ty: Type,
}

impl Constant {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// How a parameter may be passed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    PositionalOnly,
    Regular,
    KeywordOnly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
    pub kind: ParameterKind,
    /// Whether the parameter has a default value.
    pub optional: bool,
}

impl Parameter {
    /// A regular, required parameter of type `Any`.
    pub fn any(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: Type::Anything,
            kind: ParameterKind::Regular,
            optional: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<Parameter>,
    pub starargs: Option<Parameter>,
    pub starstarargs: Option<Parameter>,
    pub return_type: Type,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    /// One entry per overload.
    pub signatures: Vec<Signature>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Class {
    pub name: String,
    pub bases: Vec<Type>,
    pub keywords: Vec<(String, Type)>,
    pub constants: Vec<Constant>,
    pub methods: Vec<Function>,
    pub classes: Vec<Class>,
}

impl Class {
    /// A class with no bases and an empty body.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            keywords: Vec::new(),
            constants: Vec::new(),
            methods: Vec::new(),
            classes: Vec::new(),
        }
    }
}

/// Any top-level or class-level declaration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Definition {
    Constant(Constant),
    Function(Function),
    Class(Class),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Constant(c) => &c.name,
            Definition::Function(f) => &f.name,
            Definition::Class(c) => &c.name,
        }
    }
}

/// The declarations of one module.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclUnit {
    pub name: String,
    pub constants: Vec<Constant>,
    pub functions: Vec<Function>,
    pub classes: Vec<Class>,
}

impl TypeDeclUnit {
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.functions.is_empty() && self.classes.is_empty()
    }

    pub fn lookup_constant(&self, name: &str) -> Option<&Constant> {
        self.constants.iter().find(|c| c.name == name)
    }

    pub fn lookup_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn lookup_class(&self, name: &str) -> Option<&Class> {
        self.classes.iter().find(|c| c.name == name)
    }
}
