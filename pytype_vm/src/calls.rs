//! Calling values and reading attributes.

use crate::context::Context;
use crate::error::{AnalysisError, AnalysisResult};
use crate::errors::ErrorKind;
use crate::flow::Variable;
use crate::frame::Frame;
use crate::function_call_helper::FunctionCallHelper;
use crate::heap::{ClassId, FrameId, FunctionId};
use crate::values::{
    bind_to, get_atomic_constant, Args, ClassData, FunctionData, InterpreterFunction,
    PytdFunction, SpecialBehavior, Value,
};
use indexmap::IndexMap;
use tracing::{debug, trace};

/// Call every value `func` may hold and join the results.
pub fn call_function(ctx: &mut Context, func: &Variable, args: Args) -> AnalysisResult<Variable> {
    let callees: Vec<Value> = func.values().cloned().collect();
    let mut results = Vec::new();
    for callee in &callees {
        let result = call_value(ctx, callee, args.clone())?;
        results.extend(result.values().cloned());
    }
    Ok(Variable::from_values(results))
}

pub fn call_value(ctx: &mut Context, callee: &Value, args: Args) -> AnalysisResult<Variable> {
    match callee {
        Value::Any => Ok(Value::Any.to_variable()),
        Value::Null => Err(AnalysisError::InternalConsistency(
            "call of a NULL stack entry".into(),
        )),
        Value::Union(union) => {
            let mut results = Vec::new();
            for member in union.members().to_vec() {
                let result = call_value(ctx, &member, args.clone())?;
                results.extend(result.values().cloned());
            }
            Ok(Variable::from_values(results))
        }
        Value::Function(id) => call_function_id(ctx, *id, args, None),
        Value::BoundFunction(bound) => {
            call_function_id(ctx, bound.function, args, Some((*bound.receiver).clone()))
        }
        Value::Class(cls) => instantiate_class(ctx, *cls, args),
        Value::Instance(_) | Value::FrozenInstance(_) => {
            let Some(cls) = ctx.class_of(callee) else {
                return Ok(Value::Any.to_variable());
            };
            match ctx.heap.lookup_class_attribute(cls, "__call__") {
                Some(Value::Function(id)) => call_function_id(ctx, id, args, Some(callee.clone())),
                Some(_) => Ok(Value::Any.to_variable()),
                None if ctx.heap.has_opaque_ancestry(cls, ctx.builtins.object) => {
                    Ok(Value::Any.to_variable())
                }
                None => Ok(not_callable(ctx, callee)),
            }
        }
        _ => Ok(not_callable(ctx, callee)),
    }
}

fn not_callable(ctx: &mut Context, callee: &Value) -> Variable {
    let repr = callee.repr(&ctx.heap);
    ctx.record_error(ErrorKind::NotCallable(repr));
    Value::Any.to_variable()
}

fn call_function_id(
    ctx: &mut Context,
    id: FunctionId,
    args: Args,
    receiver: Option<Value>,
) -> AnalysisResult<Variable> {
    match ctx.heap.function(id) {
        FunctionData::Interpreter(function) => {
            if ctx.is_active(id) || ctx.call_depth() >= ctx.options.max_call_depth {
                debug!(function = %function.qualname, depth = ctx.call_depth(), "not descending into call");
                return Ok(Value::Any.to_variable());
            }
            let frame = run_interpreter_function(ctx, id, args, receiver)?;
            // A callee that never returns leaves the rest of the caller
            // unreachable; its result only keeps the stack shaped.
            Ok(ctx
                .heap
                .frame(frame)
                .return_variable()
                .unwrap_or_else(|| Value::Any.to_variable()))
        }
        FunctionData::Pytd(function) => {
            let function = function.clone();
            call_pytd_function(ctx, &function, args, receiver)
        }
    }
}

fn call_pytd_function(
    ctx: &mut Context,
    function: &PytdFunction,
    mut args: Args,
    receiver: Option<Value>,
) -> AnalysisResult<Variable> {
    if let Some(receiver) = receiver {
        args.posargs.insert(0, receiver.to_variable());
    }
    match function.special {
        Some(SpecialBehavior::BuildClass) => {
            let frame = args.frame.clone().ok_or_else(|| {
                AnalysisError::InternalConsistency("__build_class__ called without a frame".into())
            })?;
            let cls = FunctionCallHelper::new(frame).build_class(ctx, &args)?;
            Ok(Value::Class(cls).to_variable())
        }
        Some(SpecialBehavior::TypeNew) => type_new(ctx, &args),
        Some(SpecialBehavior::Overlay(call)) => {
            let mapped = function.signature.map_args(&args);
            let full_name = format!("{}.{}", function.module, function.name);
            for error in &mapped.errors {
                ctx.record_error(ErrorKind::WrongArgCount(full_name.clone(), error.to_string()));
            }
            call(ctx, &mapped.argdict)
        }
        None => Ok(function.return_value.clone().to_variable()),
    }
}

/// Run an interpreter function in a new frame and store the frame.
pub fn run_interpreter_function(
    ctx: &mut Context,
    id: FunctionId,
    mut args: Args,
    receiver: Option<Value>,
) -> AnalysisResult<FrameId> {
    let function = interpreter_function(ctx, id)?;
    if let Some(receiver) = receiver {
        args.posargs.insert(0, receiver.to_variable());
    }
    let mapped = function.signature.map_args(&args);
    for error in &mapped.errors {
        ctx.record_error(ErrorKind::WrongArgCount(
            function.qualname.clone(),
            error.to_string(),
        ));
    }
    run_frame(ctx, id, &function, mapped.argdict)
}

/// Analyze a function or bound method with every parameter set to `Any`.
pub fn analyze_function(ctx: &mut Context, value: &Value) -> AnalysisResult<Vec<FrameId>> {
    let (id, receiver) = match value {
        Value::Function(id) => (*id, None),
        Value::BoundFunction(bound) => (bound.function, Some((*bound.receiver).clone())),
        _ => return Ok(Vec::new()),
    };
    if ctx.heap.function(id).as_interpreter().is_none() {
        return Ok(Vec::new());
    }
    let function = interpreter_function(ctx, id)?;
    debug!(function = %function.qualname, bound = receiver.is_some(), "analyzing");
    let locals = function.signature.make_fake_args(receiver);
    Ok(vec![run_frame(ctx, id, &function, locals)?])
}

fn interpreter_function(ctx: &Context, id: FunctionId) -> AnalysisResult<InterpreterFunction> {
    ctx.heap
        .function(id)
        .as_interpreter()
        .cloned()
        .ok_or_else(|| {
            AnalysisError::InternalConsistency(format!(
                "{} is not an interpreter function",
                ctx.heap.function(id).full_name()
            ))
        })
}

fn run_frame(
    ctx: &mut Context,
    id: FunctionId,
    function: &InterpreterFunction,
    locals: IndexMap<String, Variable>,
) -> AnalysisResult<FrameId> {
    let mut frame = Frame::function(id, function, locals);
    ctx.push_call(id);
    let result = frame.run(ctx);
    ctx.pop_call();
    result?;
    Ok(ctx.heap.add_frame(frame))
}

fn instantiate_class(ctx: &mut Context, cls: ClassId, args: Args) -> AnalysisResult<Variable> {
    if cls == ctx.builtins.type_ {
        return call_type(ctx, &args);
    }
    if !ctx.heap.class(cls).is_interpreter() {
        return Ok(Value::FrozenInstance(cls).to_variable());
    }
    let instance = ctx.heap.instantiate(cls);
    if let Some(Value::Function(init)) = ctx.heap.lookup_class_attribute(cls, "__init__") {
        if ctx.heap.function(init).as_interpreter().is_some() {
            call_function_id(ctx, init, args, Some(instance.clone()))?;
        }
    }
    Ok(instance.to_variable())
}

/// `type(x)` or `type(name, bases, namespace)`.
fn call_type(ctx: &mut Context, args: &Args) -> AnalysisResult<Variable> {
    match args.posargs.as_slice() {
        [obj] => {
            let classes: Vec<Value> = obj
                .values()
                .map(|value| match ctx.class_of(value) {
                    Some(cls) => Value::Class(cls),
                    None => Value::Any,
                })
                .collect();
            Ok(Variable::from_values(classes))
        }
        [_, _, _] => type_new(ctx, args),
        _ => Ok(Value::Any.to_variable()),
    }
}

/// `type.__new__(mcs, name, bases, namespace)`, also reached as
/// `type(name, bases, namespace)`. Builds a class when every input is
/// concrete and returns `Any` otherwise.
pub fn type_new(ctx: &mut Context, args: &Args) -> AnalysisResult<Variable> {
    let any = Ok(Value::Any.to_variable());
    let (mcs, name, bases, namespace) = match args.posargs.as_slice() {
        [mcs, name, bases, namespace] => (Some(mcs), name, bases, namespace),
        [name, bases, namespace] => (None, name, bases, namespace),
        _ => return any,
    };
    let Ok(name) = get_atomic_constant::<String>(name) else {
        return any;
    };
    let Some(bases) = class_tuple(bases) else {
        return any;
    };
    let Some(members) = namespace_members(namespace) else {
        return any;
    };
    let metaclass = mcs
        .and_then(|var| var.get_atomic_value().ok())
        .and_then(Value::as_class)
        .filter(|cls| *cls != ctx.builtins.type_);

    let functions = members
        .values()
        .filter_map(Value::as_function)
        .filter(|id| ctx.heap.function(*id).as_interpreter().is_some())
        .collect();
    let classes = members
        .values()
        .filter_map(Value::as_class)
        .filter(|cls| ctx.heap.class(*cls).is_interpreter())
        .collect();
    trace!(class = %name, "type.__new__");
    let cls = ctx.heap.add_class(ClassData::interpreter(
        &name,
        bases,
        members,
        IndexMap::new(),
        metaclass,
        functions,
        classes,
    ));
    Ok(Value::Class(cls).to_variable())
}

fn class_tuple(var: &Variable) -> Option<Vec<ClassId>> {
    let elements = match var.get_atomic_value().ok()? {
        Value::Tuple(tuple) => tuple.elements()?,
        Value::Constant(crate::values::Constant::Tuple(items)) if items.is_empty() => &[],
        _ => return None,
    };
    elements
        .iter()
        .map(|element| element.get_atomic_value().ok().and_then(Value::as_class))
        .collect()
}

fn namespace_members(var: &Variable) -> Option<IndexMap<String, Value>> {
    let Value::Dict(dict) = var.get_atomic_value().ok()? else {
        return None;
    };
    let entries = dict.to_function_arg_dict().ok()?.into_entries()?;
    Some(
        entries
            .into_iter()
            .map(|(name, var)| (name, var.joined_value()))
            .collect(),
    )
}

/// Look `name` up on `value`. `None` means the attribute does not exist.
pub fn get_attribute(ctx: &mut Context, value: &Value, name: &str) -> Option<Variable> {
    match value {
        Value::Null => None,
        Value::Union(union) => {
            let mut values = Vec::new();
            for member in union.members().to_vec() {
                if let Some(var) = get_attribute(ctx, &member, name) {
                    values.extend(var.values().cloned());
                }
            }
            (!values.is_empty()).then(|| Variable::from_values(values))
        }
        Value::Instance(id) => {
            let instance = ctx.heap.instance(*id);
            if let Some(var) = instance.members.get(name) {
                return Some(var.clone());
            }
            let cls = instance.cls;
            instance_attribute(ctx, cls, value, name)
        }
        Value::FrozenInstance(cls) => instance_attribute(ctx, *cls, value, name),
        Value::Constant(constant) => {
            let cls = ctx.builtins.class_of_constant(constant);
            instance_attribute(ctx, cls, value, name)
        }
        Value::Class(cls) => class_attribute(ctx, *cls, value, name),
        Value::Any
        | Value::Function(_)
        | Value::BoundFunction(_)
        | Value::Tuple(_)
        | Value::List(_)
        | Value::Dict(_)
        | Value::FunctionArgTuple(_)
        | Value::FunctionArgDict(_) => Some(Value::Any.to_variable()),
    }
}

/// Attribute of an instance found on its class. Interpreter methods come
/// back bound to the instance.
fn instance_attribute(ctx: &Context, cls: ClassId, receiver: &Value, name: &str) -> Option<Variable> {
    match ctx.heap.lookup_class_attribute(cls, name) {
        Some(Value::Function(id)) if ctx.heap.function(id).as_interpreter().is_some() => {
            Some(bind_to(id, receiver.clone()).to_variable())
        }
        Some(value) => Some(value.to_variable()),
        None if name == "__class__" => Some(Value::Class(cls).to_variable()),
        None if ctx.heap.has_opaque_ancestry(cls, ctx.builtins.object) => {
            Some(Value::Any.to_variable())
        }
        None => None,
    }
}

fn class_attribute(ctx: &Context, cls: ClassId, value: &Value, name: &str) -> Option<Variable> {
    if let Some(attr) = ctx.heap.lookup_class_attribute(cls, name) {
        return Some(attr.to_variable());
    }
    if let Some(meta) = ctx.heap.class(cls).metaclass {
        if let Some(var) = instance_attribute(ctx, meta, value, name) {
            return Some(var);
        }
    }
    match name {
        "__name__" | "__qualname__" | "__module__" => {
            Some(Value::FrozenInstance(ctx.builtins.str_).to_variable())
        }
        "__class__" => Some(
            Value::Class(ctx.heap.class(cls).metaclass.unwrap_or(ctx.builtins.type_)).to_variable(),
        ),
        _ if ctx.heap.has_opaque_ancestry(cls, ctx.builtins.object) => {
            Some(Value::Any.to_variable())
        }
        _ => None,
    }
}

/// `obj.name = value`. Instances accumulate every value assigned;
/// interpreter classes take the joined value as a member.
pub fn set_attribute(ctx: &mut Context, obj: &Variable, name: &str, value: Variable) {
    for target in obj.values() {
        match target {
            Value::Instance(id) => {
                let members = &mut ctx.heap.instance_mut(*id).members;
                match members.get_mut(name) {
                    Some(existing) => existing.merge_from(&value),
                    None => {
                        members.insert(name.to_string(), value.clone());
                    }
                }
            }
            Value::Class(cls) if ctx.heap.class(*cls).is_interpreter() => {
                ctx.heap
                    .class_mut(*cls)
                    .members
                    .insert(name.to_string(), value.joined_value());
            }
            _ => trace!(attribute = name, "ignoring attribute store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{CodeBuilder, ConstValue, Opcode};
    use crate::frame::{new_scope, FrameRef};
    use crate::values::{Dict, Signature, Tuple};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn add_function(ctx: &mut Context, code: crate::bytecode::OrderedCode) -> FunctionId {
        let code = Rc::new(code);
        let signature = Signature::from_code(&code, vec![], IndexMap::new());
        ctx.heap.add_function(FunctionData::Interpreter(InterpreterFunction {
            name: code.name.clone(),
            qualname: code.qualname().to_string(),
            code,
            signature,
            enclosing: FrameRef {
                name: Rc::from("<module>"),
                globals: new_scope(IndexMap::new()),
                enclosing: Vec::new(),
            },
        }))
    }

    fn add_class(ctx: &mut Context, name: &str, members: IndexMap<String, Value>) -> ClassId {
        let object = ctx.builtins.object;
        ctx.heap.add_class(ClassData::interpreter(
            name,
            vec![object],
            members,
            IndexMap::new(),
            None,
            vec![],
            vec![],
        ))
    }

    #[test]
    fn test_call_declared_function() {
        let mut ctx = Context::default();
        let len = ctx.builtins.lookup("len").cloned().unwrap();
        let result = call_value(&mut ctx, &len, Args::positional(vec![Value::Any.to_variable()]))
            .unwrap();
        assert!(result.has_atomic_value(&Value::FrozenInstance(ctx.builtins.int)));
    }

    #[test]
    fn test_call_interpreter_function_and_arity_error() {
        let mut ctx = Context::default();
        let code = CodeBuilder::function("f")
            .params(&["x"])
            .op(Opcode::LoadFast("x".into()))
            .op(Opcode::ReturnValue)
            .build();
        let f = add_function(&mut ctx, code);
        let result = call_value(
            &mut ctx,
            &Value::Function(f),
            Args::positional(vec![Value::constant("s").to_variable()]),
        )
        .unwrap();
        assert!(result.has_atomic_value(&Value::constant("s")));

        call_value(&mut ctx, &Value::Function(f), Args::default()).unwrap();
        assert!(ctx.errorlog.has("wrong-arg-count"));
    }

    #[test]
    fn test_recursive_call_returns_any() {
        let mut ctx = Context::default();
        let code = CodeBuilder::function("f")
            .op(Opcode::LoadGlobal {
                name: "f".into(),
                push_null: true,
            })
            .op(Opcode::Call(0))
            .op(Opcode::ReturnValue)
            .build();
        let f = add_function(&mut ctx, code);
        let FunctionData::Interpreter(function) = ctx.heap.function(f) else {
            unreachable!();
        };
        function
            .enclosing
            .globals
            .borrow_mut()
            .insert("f".into(), Value::Function(f).to_variable());
        let result = call_value(&mut ctx, &Value::Function(f), Args::default()).unwrap();
        assert!(result.has_atomic_value(&Value::Any));
        assert_eq!(ctx.call_depth(), 0);
    }

    #[test]
    fn test_not_callable() {
        let mut ctx = Context::default();
        let result = call_value(&mut ctx, &Value::constant(3i64), Args::default()).unwrap();
        assert!(result.has_atomic_value(&Value::Any));
        assert!(ctx.errorlog.has("not-callable"));
    }

    #[test]
    fn test_null_callee_is_fatal() {
        let mut ctx = Context::default();
        assert!(matches!(
            call_value(&mut ctx, &Value::Null, Args::default()),
            Err(AnalysisError::InternalConsistency(_))
        ));
    }

    #[test]
    fn test_instantiate_runs_init() {
        // class A:
        //     def __init__(self): self.x = 1
        let mut ctx = Context::default();
        let init = CodeBuilder::function("__init__")
            .qualname("A.__init__")
            .params(&["self"])
            .load_const(ConstValue::Int(1))
            .op(Opcode::LoadFast("self".into()))
            .op(Opcode::StoreAttr("x".into()))
            .return_none()
            .build();
        let init = add_function(&mut ctx, init);
        let mut members = IndexMap::new();
        members.insert("__init__".to_string(), Value::Function(init));
        let a = add_class(&mut ctx, "A", members);

        let result = call_value(&mut ctx, &Value::Class(a), Args::default()).unwrap();
        let instance = result.get_atomic_value().unwrap().clone();
        let Value::Instance(id) = instance else {
            panic!("expected an instance, got {:?}", instance);
        };
        assert_eq!(ctx.heap.instance(id).cls, a);
        let x = get_attribute(&mut ctx, &instance, "x").unwrap();
        assert!(x.has_atomic_value(&Value::constant(1i64)));
    }

    #[test]
    fn test_method_lookup_binds_instance() {
        let mut ctx = Context::default();
        let code = CodeBuilder::function("m")
            .qualname("A.m")
            .params(&["self"])
            .return_none()
            .build();
        let m = add_function(&mut ctx, code);
        let mut members = IndexMap::new();
        members.insert("m".to_string(), Value::Function(m));
        let a = add_class(&mut ctx, "A", members);
        let instance = ctx.heap.instantiate(a);

        let attr = get_attribute(&mut ctx, &instance, "m").unwrap();
        assert_eq!(attr.get_atomic_value().unwrap(), &bind_to(m, instance.clone()));
        assert!(get_attribute(&mut ctx, &instance, "missing").is_none());
        // on the class itself the function stays unbound
        let attr = get_attribute(&mut ctx, &Value::Class(a), "m").unwrap();
        assert!(attr.has_atomic_value(&Value::Function(m)));
    }

    #[test]
    fn test_declared_instance_attributes_are_any() {
        let mut ctx = Context::default();
        let int = ctx.builtins.int;
        let attr = get_attribute(&mut ctx, &Value::FrozenInstance(int), "real").unwrap();
        assert!(attr.has_atomic_value(&Value::Any));
    }

    #[test]
    fn test_type_of_value() {
        let mut ctx = Context::default();
        let type_ = Value::Class(ctx.builtins.type_);
        let result = call_value(
            &mut ctx,
            &type_,
            Args::positional(vec![Value::constant(1i64).to_variable()]),
        )
        .unwrap();
        assert!(result.has_atomic_value(&Value::Class(ctx.builtins.int)));
    }

    #[test]
    fn test_type_with_three_arguments_builds_class() {
        let mut ctx = Context::default();
        let object = ctx.builtins.object;
        let namespace = Dict::new(vec![(
            Value::constant("x").to_variable(),
            Value::constant(1i64).to_variable(),
        )]);
        let args = Args::positional(vec![
            Value::constant("T").to_variable(),
            Value::Tuple(Tuple::new(vec![Value::Class(object).to_variable()])).to_variable(),
            Value::Dict(namespace).to_variable(),
        ]);
        let type_ = Value::Class(ctx.builtins.type_);
        let result = call_value(&mut ctx, &type_, args).unwrap();
        let cls = result.get_atomic_value().unwrap().as_class().unwrap();
        let data = ctx.heap.class(cls);
        assert_eq!(data.full_name(), "T");
        assert_eq!(data.bases, vec![object]);
        assert_eq!(data.members["x"], Value::constant(1i64));
        assert_eq!(data.metaclass, None);
    }

    #[test]
    fn test_type_new_with_unknown_name_is_any() {
        let mut ctx = Context::default();
        let args = Args::positional(vec![
            Value::Any.to_variable(),
            Value::Tuple(Tuple::new(vec![])).to_variable(),
            Value::Dict(Dict::new(vec![])).to_variable(),
        ]);
        let result = type_new(&mut ctx, &args).unwrap();
        assert!(result.has_atomic_value(&Value::Any));
    }

    #[test]
    fn test_set_attribute_accumulates_on_instances() {
        let mut ctx = Context::default();
        let a = add_class(&mut ctx, "A", IndexMap::new());
        let instance = ctx.heap.instantiate(a);
        let obj = instance.clone().to_variable();
        set_attribute(&mut ctx, &obj, "x", Value::constant(1i64).to_variable());
        set_attribute(&mut ctx, &obj, "x", Value::constant("s").to_variable());
        let x = get_attribute(&mut ctx, &instance, "x").unwrap();
        assert_eq!(x.len(), 2);
    }
}
