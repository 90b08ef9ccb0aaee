//! Exporting analysis results as type declarations.

use crate::calls;
use crate::context::Context;
use crate::error::AnalysisError;
use crate::flow::Variable;
use crate::heap::{ClassId, Heap};
use crate::values::{bind_to, Constant, FunctionData, Value};
use pytype_vm_pytd::{
    Class, Constant as PytdConstant, Definition, Function, Parameter, ParameterKind, Signature,
    Type,
};
use thiserror::Error;
use tracing::debug;

/// Class-body entries the compiler adds to every class.
const IMPLICIT_CLASS_MEMBERS: &[&str] = &["__module__", "__qualname__", "__doc__", "__classcell__"];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConvertError {
    /// The value has no declaration form; callers export its type instead.
    #[error("cannot declare a {0}")]
    NotImplemented(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

pub fn class_type(heap: &Heap, cls: ClassId) -> Type {
    Type::class(heap.class(cls).full_name())
}

/// Union of the types of every value `var` may hold.
pub fn var_type(heap: &Heap, var: &Variable) -> Type {
    Type::union(var.values().map(|value| to_pytd_type(heap, value)))
}

fn generic(base: &str, parameters: Vec<Type>) -> Type {
    Type::Generic {
        base: format!("builtins.{}", base),
        parameters,
    }
}

fn constant_type(constant: &Constant) -> Type {
    match constant {
        Constant::None => Type::none(),
        Constant::Tuple(items) if !items.is_empty() => {
            generic("tuple", items.iter().map(constant_type).collect())
        }
        Constant::Code(_) => Type::Anything,
        other => Type::builtin(other.type_name()),
    }
}

/// The type of a value.
pub fn to_pytd_type(heap: &Heap, value: &Value) -> Type {
    match value {
        Value::Any | Value::Null => Type::Anything,
        Value::Constant(constant) => constant_type(constant),
        Value::Union(union) => Type::union(union.members().iter().map(|m| to_pytd_type(heap, m))),
        Value::Class(cls) => generic("type", vec![class_type(heap, *cls)]),
        Value::Function(_) | Value::BoundFunction(_) => Type::Callable(Box::new(Type::Anything)),
        Value::Instance(id) => class_type(heap, heap.instance(*id).cls),
        Value::FrozenInstance(cls) => class_type(heap, *cls),
        Value::Tuple(tuple) => match tuple.elements() {
            Some(elements) if !elements.is_empty() => {
                generic("tuple", elements.iter().map(|e| var_type(heap, e)).collect())
            }
            _ => Type::builtin("tuple"),
        },
        Value::List(list) => match list.elements() {
            Some(elements) if !elements.is_empty() => generic(
                "list",
                vec![Type::union(elements.iter().map(|e| var_type(heap, e)))],
            ),
            _ => Type::builtin("list"),
        },
        Value::Dict(dict) => match dict.entries() {
            Some(entries) if !entries.is_empty() => generic(
                "dict",
                vec![
                    Type::union(entries.iter().map(|(k, _)| var_type(heap, k))),
                    Type::union(entries.iter().map(|(_, v)| var_type(heap, v))),
                ],
            ),
            _ => Type::builtin("dict"),
        },
        Value::FunctionArgTuple(_) => Type::builtin("tuple"),
        Value::FunctionArgDict(_) => Type::builtin("dict"),
    }
}

/// The declaration of an interpreter function or class.
///
/// Functions are analyzed again with unknown arguments to find their
/// return type. Anything else is [`ConvertError::NotImplemented`].
pub fn to_pytd_def(ctx: &mut Context, value: &Value) -> Result<Definition, ConvertError> {
    match value {
        Value::Function(id) if ctx.heap.function(*id).as_interpreter().is_some() => {
            Ok(Definition::Function(function_def(ctx, value, None)?))
        }
        Value::Class(cls) if ctx.heap.class(*cls).is_interpreter() => {
            Ok(Definition::Class(class_def(ctx, *cls)?))
        }
        other => Err(ConvertError::NotImplemented(other.kind().name().to_string())),
    }
}

/// Declaration of `value`, a function or bound method, named `name` or
/// after the function.
fn function_def(
    ctx: &mut Context,
    value: &Value,
    name: Option<&str>,
) -> Result<Function, ConvertError> {
    let id = match value {
        Value::Function(id) => *id,
        Value::BoundFunction(bound) => bound.function,
        other => return Err(ConvertError::NotImplemented(other.kind().name().to_string())),
    };
    let FunctionData::Interpreter(function) = ctx.heap.function(id) else {
        return Err(ConvertError::NotImplemented("declared function".to_string()));
    };
    let function = function.clone();
    let frames = calls::analyze_function(ctx, value)?;
    // No return on any path gives `NoReturn`.
    let return_type = Type::union(
        frames
            .iter()
            .filter_map(|frame| ctx.heap.frame(*frame).return_variable())
            .map(|var| var_type(&ctx.heap, &var)),
    );

    let signature = &function.signature;
    let param = |name: &String, kind: ParameterKind| {
        let default = signature.defaults.get(name);
        let ty = match default {
            Some(var) if !var.has_atomic_value(&Value::none()) => var_type(&ctx.heap, var),
            _ => Type::Anything,
        };
        Parameter {
            name: name.clone(),
            ty,
            kind,
            optional: default.is_some(),
        }
    };
    let mut params = Vec::new();
    for (index, name) in signature.param_names.iter().enumerate() {
        let kind = if index < signature.posonly_count {
            ParameterKind::PositionalOnly
        } else {
            ParameterKind::Regular
        };
        params.push(param(name, kind));
    }
    for name in &signature.kwonly_params {
        params.push(param(name, ParameterKind::KeywordOnly));
    }

    debug!(function = %function.qualname, "exporting function");
    Ok(Function {
        name: name.map_or_else(|| function.name.clone(), str::to_string),
        signatures: vec![Signature {
            params,
            starargs: signature.varargs.as_ref().map(Parameter::any),
            starstarargs: signature.kwargs.as_ref().map(Parameter::any),
            return_type,
        }],
    })
}

fn is_interpreter_function(heap: &Heap, value: &Value) -> bool {
    matches!(value, Value::Function(id) if heap.function(*id).as_interpreter().is_some())
}

fn class_def(ctx: &mut Context, cls: ClassId) -> Result<Class, ConvertError> {
    let data = ctx.heap.class(cls).clone();
    debug!(class = %data.name, "exporting class");
    let bases = data.bases.iter().map(|b| class_type(&ctx.heap, *b)).collect();
    let keywords = data
        .keywords()
        .map(|keywords| {
            keywords
                .iter()
                .map(|(name, value)| {
                    let ty = match value {
                        Value::Class(c) => class_type(&ctx.heap, *c),
                        other => to_pytd_type(&ctx.heap, other),
                    };
                    (name.clone(), ty)
                })
                .collect()
        })
        .unwrap_or_default();

    // Methods share one instance; `__init__` runs first so the others see
    // the attributes it sets.
    let instance = ctx.heap.instantiate(cls);
    let mut init = match data.members.get("__init__") {
        Some(value @ Value::Function(id)) if is_interpreter_function(&ctx.heap, value) => {
            let bound = bind_to(*id, instance.clone());
            Some(function_def(ctx, &bound, Some("__init__"))?)
        }
        _ => None,
    };

    let mut constants = Vec::new();
    let mut methods = Vec::new();
    let mut classes = Vec::new();
    for (name, member) in &data.members {
        if IMPLICIT_CLASS_MEMBERS.contains(&name.as_str()) {
            continue;
        }
        match member {
            Value::Function(id) if is_interpreter_function(&ctx.heap, member) => {
                let analyzed = if name == "__init__" { init.take() } else { None };
                let method = match analyzed {
                    Some(method) => method,
                    None => {
                        let bound = bind_to(*id, instance.clone());
                        function_def(ctx, &bound, Some(name))?
                    }
                };
                methods.push(method);
            }
            Value::Class(nested) if data.classes().contains(nested) => {
                classes.push(class_def(ctx, *nested)?);
            }
            other => constants.push(PytdConstant::new(name.clone(), to_pytd_type(&ctx.heap, other))),
        }
    }

    if let Value::Instance(id) = instance {
        for (name, var) in &ctx.heap.instance(id).members {
            if !data.members.contains_key(name) {
                constants.push(PytdConstant::new(name.clone(), var_type(&ctx.heap, var)));
            }
        }
    }

    Ok(Class {
        name: data.name.clone(),
        bases,
        keywords,
        constants,
        methods,
        classes,
    })
}
