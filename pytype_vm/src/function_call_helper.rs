//! Call argument normalization and class construction.

use crate::calls;
use crate::context::Context;
use crate::error::{AnalysisError, AnalysisResult};
use crate::flow::Variable;
use crate::frame::FrameRef;
use crate::heap::ClassId;
use crate::values::{
    get_atomic_constant, join_values, resolve_metaclass, Args, ClassData, Constant, Dict,
    FunctionArgDict, FunctionArgTuple, Tuple, Value,
};
use indexmap::IndexMap;
use tracing::debug;

/// Turns operand lists into [`Args`] for calls made from one frame.
///
/// A `KW_NAMES` instruction stores the keyword names of the next `CALL`;
/// the call consumes them. Names still pending when new ones arrive, or
/// when a `CALL_FUNCTION_EX` runs, mean the instruction stream is broken.
#[derive(Debug)]
pub struct FunctionCallHelper {
    frame: FrameRef,
    kw_names: Option<Vec<String>>,
}

impl FunctionCallHelper {
    pub fn new(frame: FrameRef) -> Self {
        Self {
            frame,
            kw_names: None,
        }
    }

    pub fn frame(&self) -> &FrameRef {
        &self.frame
    }

    pub fn has_pending_kw_names(&self) -> bool {
        self.kw_names.is_some()
    }

    pub fn set_kw_names(&mut self, names: Vec<String>) -> AnalysisResult<()> {
        if let Some(pending) = &self.kw_names {
            return Err(AnalysisError::InternalConsistency(format!(
                "keyword names {:?} set while {:?} are still pending",
                names, pending
            )));
        }
        self.kw_names = Some(names);
        Ok(())
    }

    /// Arguments of a `CALL`. The trailing operands pair with the pending
    /// keyword names, the rest are positional.
    pub fn make_function_args(&mut self, mut args: Vec<Variable>) -> AnalysisResult<Args> {
        let names = self.kw_names.take().unwrap_or_default();
        if names.len() > args.len() {
            return Err(AnalysisError::InternalConsistency(format!(
                "{} keyword names for {} operands",
                names.len(),
                args.len()
            )));
        }
        let values = args.split_off(args.len() - names.len());
        Ok(Args {
            posargs: args,
            kwargs: names.into_iter().zip(values).collect(),
            starargs: None,
            starstarargs: None,
            frame: Some(self.frame.clone()),
        })
    }

    /// Arguments of a `CALL_FUNCTION_EX`.
    pub fn make_function_args_ex(
        &mut self,
        starargs: Variable,
        starstarargs: Option<Variable>,
    ) -> AnalysisResult<Args> {
        if let Some(pending) = &self.kw_names {
            return Err(AnalysisError::InternalConsistency(format!(
                "keyword names {:?} pending at an expanded call",
                pending
            )));
        }
        let mut args = Args {
            frame: Some(self.frame.clone()),
            ..Args::default()
        };

        match unpack_starargs(&starargs)?.into_elements() {
            Some(elements) => args.posargs = elements,
            None => args.starargs = Some(starargs),
        }

        if let Some(starstarargs) = starstarargs {
            let unpacked = unpack_starstarargs(&starstarargs)?;
            match unpacked.entries() {
                Some(entries) => args.kwargs = entries.clone(),
                None => {
                    args.starstarargs = Some(Value::FunctionArgDict(unpacked).to_variable());
                }
            }
        }
        Ok(args)
    }

    /// Build the class a `class` statement defines.
    ///
    /// `posargs` hold the body function, the name and the bases; `kwargs`
    /// the class keywords. A metaclass whose `__new__` is not the default
    /// gets to build the class; its result is used only when it is a class
    /// carrying the expected name.
    pub fn build_class(&self, ctx: &mut Context, args: &Args) -> AnalysisResult<ClassId> {
        let [body, name, bases @ ..] = args.posargs.as_slice() else {
            return Err(AnalysisError::Unhandled(format!(
                "__build_class__ takes a body and a name, got {} arguments",
                args.posargs.len()
            )));
        };
        let body = match body.get_atomic_value()? {
            Value::Function(id) if ctx.heap.function(*id).as_interpreter().is_some() => *id,
            other => {
                return Err(AnalysisError::type_mismatch("class body", other.type_name()));
            }
        };
        let class_name: String = get_atomic_constant(name)?;

        let mut base_classes = Vec::with_capacity(bases.len());
        for base in bases {
            match base.get_atomic_value() {
                Ok(Value::Class(cls)) => base_classes.push(*cls),
                Ok(other) => {
                    return Err(AnalysisError::Unhandled(format!(
                        "base of class {} is a {}, not a class",
                        class_name,
                        other.type_name()
                    )))
                }
                Err(_) => {
                    return Err(AnalysisError::Unhandled(format!(
                        "base of class {} has {} possible values",
                        class_name,
                        base.len()
                    )))
                }
            }
        }

        let mut keywords = IndexMap::new();
        for (key, var) in &args.kwargs {
            let value = var.get_atomic_value().map_err(|_| {
                AnalysisError::Unhandled(format!(
                    "keyword {} of class {} has {} possible values",
                    key,
                    class_name,
                    var.len()
                ))
            })?;
            keywords.insert(key.clone(), value.clone());
        }

        let frame_id = calls::run_interpreter_function(ctx, body, Args::default(), None)?;
        let frame = ctx.heap.frame(frame_id);
        let members: IndexMap<String, Value> = frame
            .final_locals()
            .iter()
            .map(|(name, var)| (name.clone(), var.joined_value()))
            .collect();
        let functions = frame.functions().to_vec();
        let classes = frame.classes().to_vec();

        if let Some((cls, hook)) = self.overriding_metaclass(ctx, &keywords, &base_classes) {
            debug!(class = %class_name, metaclass = %ctx.heap.class(cls).full_name(), "calling metaclass hook");
            let hook_args = Args {
                posargs: vec![
                    Value::Class(cls).to_variable(),
                    name.clone(),
                    Value::Tuple(Tuple::new(bases.to_vec())).to_variable(),
                    Value::Dict(namespace_dict(&members)).to_variable(),
                ],
                frame: Some(self.frame.clone()),
                ..Args::default()
            };
            let result = calls::call_value(ctx, &hook, hook_args)?;
            let result = join_values(result.values().cloned());
            if let Value::Class(built) = result {
                if ctx.heap.class(built).full_name() == class_name {
                    return Ok(built);
                }
            }
            debug!(class = %class_name, "metaclass hook did not build the class");
        }

        let metaclass = resolve_metaclass(&ctx.heap, &keywords, &base_classes);
        let cls = ctx.heap.add_class(ClassData::interpreter(
            &class_name,
            base_classes,
            members,
            keywords,
            metaclass,
            functions,
            classes,
        ));
        debug!(class = %class_name, "built class");
        Ok(cls)
    }

    /// The first candidate metaclass with a `__new__` of its own, and that
    /// `__new__`. Candidates are the `metaclass` keyword, then the bases'
    /// metaclasses in order.
    fn overriding_metaclass(
        &self,
        ctx: &Context,
        keywords: &IndexMap<String, Value>,
        bases: &[ClassId],
    ) -> Option<(ClassId, Value)> {
        let explicit = keywords.get("metaclass").cloned();
        let inherited = bases
            .iter()
            .filter_map(|base| ctx.heap.class(*base).metaclass)
            .map(Value::Class);
        for candidate in explicit.into_iter().chain(inherited) {
            let Value::Class(cls) = candidate else {
                continue;
            };
            let Some(hook) = ctx.heap.lookup_class_attribute(cls, "__new__") else {
                continue;
            };
            let Value::Function(id) = hook else {
                continue;
            };
            if ctx.heap.function(id).is_default_class_hook() {
                continue;
            }
            return Some((cls, hook));
        }
        None
    }
}

/// Positional operands of `*args`.
fn unpack_starargs(var: &Variable) -> AnalysisResult<FunctionArgTuple> {
    let value = var.get_atomic_value()?;
    let unpacked = match value {
        Value::FunctionArgTuple(tuple) => tuple.clone(),
        Value::FrozenInstance(_) | Value::Any => FunctionArgTuple::indefinite(),
        Value::Tuple(tuple) => match tuple.elements() {
            Some(elements) => FunctionArgTuple::new(elements.to_vec()),
            None => FunctionArgTuple::indefinite(),
        },
        Value::List(list) => match list.elements() {
            Some(elements) => FunctionArgTuple::new(elements.to_vec()),
            None => FunctionArgTuple::indefinite(),
        },
        Value::Constant(Constant::Tuple(items)) => FunctionArgTuple::new(
            items
                .iter()
                .map(|c| Value::Constant(c.clone()).to_variable())
                .collect(),
        ),
        other => {
            return Err(AnalysisError::Unhandled(format!(
                "cannot unpack a {} as positional arguments",
                other.type_name()
            )))
        }
    };
    Ok(unpacked)
}

/// Keyword operands of `**kwargs`.
fn unpack_starstarargs(var: &Variable) -> AnalysisResult<FunctionArgDict> {
    let value = var.get_atomic_value()?;
    match value {
        Value::FunctionArgDict(dict) => Ok(dict.clone()),
        Value::FrozenInstance(_) | Value::Any => Ok(FunctionArgDict::indefinite()),
        Value::Dict(dict) => dict.to_function_arg_dict(),
        other => Err(AnalysisError::Unhandled(format!(
            "cannot unpack a {} as keyword arguments",
            other.type_name()
        ))),
    }
}

/// The class namespace handed to a metaclass, keyed by string literals.
fn namespace_dict(members: &IndexMap<String, Value>) -> Dict {
    Dict::new(
        members
            .iter()
            .map(|(name, value)| {
                (
                    Value::constant(name.as_str()).to_variable(),
                    value.clone().to_variable(),
                )
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{class_body, CodeBuilder, ConstValue, Opcode};
    use crate::frame::{new_scope, Frame};
    use crate::values::{FunctionData, InterpreterFunction, Signature};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn helper() -> FunctionCallHelper {
        FunctionCallHelper::new(FrameRef {
            name: Rc::from("<module>"),
            globals: new_scope(IndexMap::new()),
            enclosing: Vec::new(),
        })
    }

    fn var(value: Value) -> Variable {
        value.to_variable()
    }

    fn int(i: i64) -> Variable {
        var(Value::constant(i))
    }

    #[test]
    fn test_positional_only() {
        let args = helper().make_function_args(vec![int(1), int(2)]).unwrap();
        assert_eq!(args.posargs, vec![int(1), int(2)]);
        assert!(args.kwargs.is_empty());
        assert!(args.frame.is_some());
    }

    #[test]
    fn test_kw_names_pair_with_trailing_operands() {
        let mut helper = helper();
        helper.set_kw_names(vec!["b".into(), "c".into()]).unwrap();
        let args = helper
            .make_function_args(vec![int(1), int(2), int(3)])
            .unwrap();
        assert_eq!(args.posargs, vec![int(1)]);
        assert_eq!(args.kwargs["b"], int(2));
        assert_eq!(args.kwargs["c"], int(3));
        assert!(!helper.has_pending_kw_names());

        // consumed by the first call
        let args = helper.make_function_args(vec![int(4)]).unwrap();
        assert_eq!(args.posargs, vec![int(4)]);
        assert!(args.kwargs.is_empty());
    }

    #[test]
    fn test_kw_names_set_twice() {
        let mut helper = helper();
        helper.set_kw_names(vec!["a".into()]).unwrap();
        assert!(matches!(
            helper.set_kw_names(vec!["b".into()]),
            Err(AnalysisError::InternalConsistency(_))
        ));
    }

    #[test]
    fn test_kw_names_pending_at_expanded_call() {
        let mut helper = helper();
        helper.set_kw_names(vec!["a".into()]).unwrap();
        let starargs = var(Value::Tuple(Tuple::new(vec![])));
        assert!(matches!(
            helper.make_function_args_ex(starargs, None),
            Err(AnalysisError::InternalConsistency(_))
        ));
    }

    #[test]
    fn test_more_kw_names_than_operands() {
        let mut helper = helper();
        helper.set_kw_names(vec!["a".into(), "b".into()]).unwrap();
        assert!(matches!(
            helper.make_function_args(vec![int(1)]),
            Err(AnalysisError::InternalConsistency(_))
        ));
    }

    #[test]
    fn test_expanded_call_with_concrete_tuple() {
        let starargs = var(Value::Tuple(Tuple::new(vec![int(1), int(2)])));
        let args = helper().make_function_args_ex(starargs, None).unwrap();
        assert_eq!(args.posargs, vec![int(1), int(2)]);
        assert!(args.starargs.is_none());
        assert!(args.kwargs.is_empty());
        assert!(args.starstarargs.is_none());
    }

    #[test]
    fn test_expanded_call_with_literal_tuple() {
        let literal = Constant::Tuple(vec![Constant::Int(1), Constant::Str("x".into())]);
        let args = helper()
            .make_function_args_ex(var(Value::Constant(literal)), None)
            .unwrap();
        assert_eq!(args.posargs, vec![int(1), var(Value::constant("x"))]);
    }

    #[test]
    fn test_expanded_call_with_indefinite_tuple_keeps_container() {
        let ctx = Context::default();
        let starargs = var(Value::FrozenInstance(ctx.builtins.tuple));
        let kwargs = var(Value::Any);
        let args = helper()
            .make_function_args_ex(starargs.clone(), Some(kwargs))
            .unwrap();
        assert!(args.posargs.is_empty());
        assert_eq!(args.starargs, Some(starargs));
        assert!(args.kwargs.is_empty());
        let starstarargs = args.starstarargs.unwrap();
        let Value::FunctionArgDict(dict) = starstarargs.get_atomic_value().unwrap() else {
            panic!("expected an unpacked keyword dict");
        };
        assert!(dict.is_indefinite());
    }

    #[test]
    fn test_expanded_call_with_concrete_dict() {
        let dict = Dict::new(vec![(var(Value::constant("x")), int(5))]);
        let args = helper()
            .make_function_args_ex(var(Value::Tuple(Tuple::new(vec![]))), Some(var(Value::Dict(dict))))
            .unwrap();
        assert_eq!(args.kwargs["x"], int(5));
        assert!(args.starstarargs.is_none());
    }

    #[test]
    fn test_expanded_call_with_bad_container() {
        let err = helper()
            .make_function_args_ex(int(3), None)
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Unhandled(_)));
    }

    fn module_frame_ref(ctx: &Context) -> FrameRef {
        let globals = ctx
            .get_module_globals()
            .into_iter()
            .map(|(name, value)| (name, value.to_variable()))
            .collect();
        FrameRef {
            name: Rc::from("<module>"),
            globals: new_scope(globals),
            enclosing: Vec::new(),
        }
    }

    fn make_function(ctx: &mut Context, code: crate::bytecode::OrderedCode) -> crate::heap::FunctionId {
        let code = Rc::new(code);
        let signature = Signature::from_code(&code, vec![], IndexMap::new());
        let enclosing = module_frame_ref(ctx);
        ctx.heap.add_function(FunctionData::Interpreter(InterpreterFunction {
            name: code.name.clone(),
            qualname: code.qualname().to_string(),
            code,
            signature,
            enclosing,
        }))
    }

    fn simple_body(ctx: &mut Context, name: &str) -> Variable {
        let body = class_body(name)
            .load_const(ConstValue::Int(1))
            .op(Opcode::StoreName("x".into()))
            .return_none()
            .build();
        var(Value::Function(make_function(ctx, body)))
    }

    #[test]
    fn test_build_simple_class() {
        let mut ctx = Context::default();
        let body = simple_body(&mut ctx, "A");
        let args = Args::positional(vec![body, var(Value::constant("A"))]);
        let cls = helper().build_class(&mut ctx, &args).unwrap();
        let data = ctx.heap.class(cls);
        assert_eq!(data.full_name(), "A");
        assert_eq!(data.members["x"], Value::constant(1i64));
        assert!(data.members.contains_key("__qualname__"));
        assert!(data.bases.is_empty());
        assert_eq!(data.metaclass, None);
    }

    #[test]
    fn test_build_class_name_must_be_str() {
        let mut ctx = Context::default();
        let body = simple_body(&mut ctx, "A");
        let args = Args::positional(vec![body, int(3)]);
        let err = helper().build_class(&mut ctx, &args).unwrap_err();
        assert_eq!(err.to_string(), "expected str, got int");
    }

    #[test]
    fn test_build_class_rejects_non_class_base() {
        let mut ctx = Context::default();
        let body = simple_body(&mut ctx, "A");
        let args = Args::positional(vec![body, var(Value::constant("A")), int(1)]);
        assert!(matches!(
            helper().build_class(&mut ctx, &args),
            Err(AnalysisError::Unhandled(_))
        ));
    }

    #[test]
    fn test_build_class_rejects_ambiguous_keyword() {
        let mut ctx = Context::default();
        let body = simple_body(&mut ctx, "A");
        let mut args = Args::positional(vec![body, var(Value::constant("A"))]);
        args.kwargs.insert(
            "flag".into(),
            Variable::from_values([Value::constant(true), Value::constant(false)]),
        );
        assert!(matches!(
            helper().build_class(&mut ctx, &args),
            Err(AnalysisError::Unhandled(_))
        ));
    }

    /// A metaclass `name(type)` whose `__new__` runs `body`.
    fn metaclass_with_hook(ctx: &mut Context, name: &str, hook: Option<crate::bytecode::OrderedCode>) -> ClassId {
        let mut members = IndexMap::new();
        let mut functions = Vec::new();
        if let Some(hook) = hook {
            let id = make_function(ctx, hook);
            members.insert("__new__".to_string(), Value::Function(id));
            functions.push(id);
        }
        let type_ = ctx.builtins.type_;
        ctx.heap.add_class(ClassData::interpreter(
            name,
            vec![type_],
            members,
            IndexMap::new(),
            None,
            functions,
            vec![],
        ))
    }

    fn class_with_metaclass(ctx: &mut Context, name: &str, metaclass: ClassId) -> ClassId {
        ctx.heap.add_class(ClassData::interpreter(
            name,
            vec![],
            IndexMap::new(),
            IndexMap::new(),
            Some(metaclass),
            vec![],
            vec![],
        ))
    }

    fn hook_frames(ctx: &Context) -> Vec<&Frame> {
        ctx.heap
            .frames()
            .map(|(_, frame)| frame)
            .filter(|frame| frame.code().name == "__new__")
            .collect()
    }

    #[test]
    fn test_metaclass_hook_runs_once_and_falls_through() {
        let mut ctx = Context::default();
        // M1 inherits type.__new__, M2 defines its own returning 42.
        let m1 = metaclass_with_hook(&mut ctx, "M1", None);
        let hook = CodeBuilder::function("__new__")
            .qualname("M2.__new__")
            .params(&["mcs", "name", "bases", "ns"])
            .load_const(ConstValue::Int(42))
            .op(Opcode::ReturnValue)
            .build();
        let m2 = metaclass_with_hook(&mut ctx, "M2", Some(hook));
        let b1 = class_with_metaclass(&mut ctx, "B1", m1);
        let b2 = class_with_metaclass(&mut ctx, "B2", m2);

        let body = simple_body(&mut ctx, "C");
        let args = Args::positional(vec![
            body,
            var(Value::constant("C")),
            var(Value::Class(b1)),
            var(Value::Class(b2)),
        ]);
        let cls = helper().build_class(&mut ctx, &args).unwrap();

        let frames = hook_frames(&ctx);
        assert_eq!(frames.len(), 1);
        let params: Vec<&String> = frames[0].initial_locals().keys().collect();
        assert_eq!(params, vec!["mcs", "name", "bases", "ns"]);
        assert!(frames[0].initial_locals()["mcs"].has_atomic_value(&Value::Class(m2)));
        assert!(frames[0].initial_locals()["name"].has_atomic_value(&Value::constant("C")));

        // The hook returned an int, so the class is synthesized.
        let data = ctx.heap.class(cls);
        assert_eq!(data.full_name(), "C");
        assert_eq!(data.bases, vec![b1, b2]);
        assert_eq!(data.metaclass, Some(m1));
    }

    #[test]
    fn test_explicit_metaclass_keyword_wins() {
        let mut ctx = Context::default();
        let hook = CodeBuilder::function("__new__")
            .qualname("Meta.__new__")
            .params(&["mcs", "name", "bases", "ns"])
            .load_const(ConstValue::None)
            .op(Opcode::ReturnValue)
            .build();
        let meta = metaclass_with_hook(&mut ctx, "Meta", Some(hook));
        let body = simple_body(&mut ctx, "C");
        let mut args = Args::positional(vec![body, var(Value::constant("C"))]);
        args.kwargs.insert("metaclass".into(), var(Value::Class(meta)));
        let cls = helper().build_class(&mut ctx, &args).unwrap();

        assert_eq!(hook_frames(&ctx).len(), 1);
        let data = ctx.heap.class(cls);
        assert_eq!(data.metaclass, Some(meta));
        assert_eq!(data.keywords().unwrap()["metaclass"], Value::Class(meta));
    }

    #[test]
    fn test_metaclass_hook_result_is_used_when_named_like_the_class() {
        // class Meta(type):
        //     def __new__(mcs, name, bases, ns):
        //         return type.__new__(mcs, name, bases, ns)
        let mut ctx = Context::default();
        let hook = CodeBuilder::function("__new__")
            .qualname("Meta.__new__")
            .params(&["mcs", "name", "bases", "ns"])
            .op(Opcode::LoadGlobal {
                name: "type".into(),
                push_null: true,
            })
            .op(Opcode::LoadAttr("__new__".into()))
            .op(Opcode::LoadFast("mcs".into()))
            .op(Opcode::LoadFast("name".into()))
            .op(Opcode::LoadFast("bases".into()))
            .op(Opcode::LoadFast("ns".into()))
            .op(Opcode::Call(4))
            .op(Opcode::ReturnValue)
            .build();
        let meta = metaclass_with_hook(&mut ctx, "Meta", Some(hook));
        let body = simple_body(&mut ctx, "C");
        let mut args = Args::positional(vec![body, var(Value::constant("C"))]);
        args.kwargs.insert("metaclass".into(), var(Value::Class(meta)));
        let before = ctx.heap.class_count();
        let cls = helper().build_class(&mut ctx, &args).unwrap();

        // One class from the hook, none synthesized afterwards.
        assert_eq!(ctx.heap.class_count(), before + 1);
        let data = ctx.heap.class(cls);
        assert_eq!(data.full_name(), "C");
        assert_eq!(data.metaclass, Some(meta));
        assert_eq!(data.members["x"], Value::constant(1i64));
        assert!(ctx.errorlog.is_empty(), "{}", ctx.errorlog);
    }

    #[test]
    fn test_default_class_hook() {
        let ctx = Context::default();
        let new = ctx
            .heap
            .lookup_class_attribute(ctx.builtins.type_, "__new__")
            .and_then(|v| v.as_function())
            .unwrap();
        assert!(ctx.heap.function(new).is_default_class_hook());
    }
}
