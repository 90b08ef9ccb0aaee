//! `assert_type` and `reveal_type`.

use super::{FunctionBuilder, Registry};
use crate::context::Context;
use crate::convert::{class_type, var_type};
use crate::error::{AnalysisError, AnalysisResult};
use crate::errors::ErrorKind;
use crate::flow::Variable;
use crate::values::{Constant, PytdFunction, SpecialBehavior, Value};
use indexmap::IndexMap;
use pytype_vm_pytd::print_type;

pub(super) fn register(registry: &mut Registry) {
    let entries: [(&str, FunctionBuilder); 2] = [
        ("assert_type", build_assert_type),
        ("reveal_type", build_reveal_type),
    ];
    for (name, builder) in entries {
        registry.insert(("builtins".to_string(), name.to_string()), builder);
    }
}

fn build_assert_type(module: &str, name: &str) -> PytdFunction {
    PytdFunction::new(module, name, &["val", "typ"], Value::none())
        .with_special(SpecialBehavior::Overlay(assert_type))
}

fn build_reveal_type(module: &str, name: &str) -> PytdFunction {
    PytdFunction::new(module, name, &["obj"], Value::Any)
        .with_special(SpecialBehavior::Overlay(reveal_type))
}

fn arg<'a>(args: &'a IndexMap<String, Variable>, name: &str) -> AnalysisResult<&'a Variable> {
    args.get(name).ok_or_else(|| {
        AnalysisError::InternalConsistency(format!("argument '{}' was not mapped", name))
    })
}

/// Compare the printed type of `val` with `typ`, given either as a class
/// or as a string.
fn assert_type(ctx: &mut Context, args: &IndexMap<String, Variable>) -> AnalysisResult<Variable> {
    let val = arg(args, "val")?;
    let typ = arg(args, "typ")?;
    let expected = match typ.get_atomic_value() {
        Ok(Value::Constant(Constant::Str(s))) => s.clone(),
        Ok(Value::Class(cls)) => print_type(&class_type(&ctx.heap, *cls)),
        _ => print_type(&var_type(&ctx.heap, typ)),
    };
    let actual = print_type(&var_type(&ctx.heap, val));
    if expected != actual {
        ctx.record_error(ErrorKind::AssertType(expected, actual));
    }
    Ok(Value::none().to_variable())
}

fn reveal_type(ctx: &mut Context, args: &IndexMap<String, Variable>) -> AnalysisResult<Variable> {
    let obj = arg(args, "obj")?;
    let printed = print_type(&var_type(&ctx.heap, obj));
    ctx.record_error(ErrorKind::RevealType(printed));
    Ok(obj.clone())
}
