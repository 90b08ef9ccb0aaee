use super::base::{Union, Value};
use super::constant::Constant;
use crate::error::{AnalysisError, AnalysisResult};
use crate::flow::Variable;

/// Join values into a single value.
///
/// No input gives `Any`, one distinct input is returned as is, and two or
/// more give a flat `Union` of the distinct inputs in first-seen order.
pub fn join_values(values: impl IntoIterator<Item = Value>) -> Value {
    let mut members: Vec<Value> = Vec::new();
    for value in values {
        match value {
            Value::Union(union) => {
                for member in union.members() {
                    if !members.contains(member) {
                        members.push(member.clone());
                    }
                }
            }
            other => {
                if !members.contains(&other) {
                    members.push(other);
                }
            }
        }
    }
    match members.len() {
        0 => Value::Any,
        1 => members.pop().unwrap_or(Value::Any),
        _ => Value::Union(Union::from_flat(members)),
    }
}

/// A literal, or one of its elements, has the wrong shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub expected: &'static str,
    pub actual: &'static str,
}

impl From<ShapeMismatch> for AnalysisError {
    fn from(mismatch: ShapeMismatch) -> Self {
        AnalysisError::type_mismatch(mismatch.expected, mismatch.actual)
    }
}

/// Rust types a literal can be extracted as.
pub trait FromConstant: Sized {
    /// Type name reported when extraction fails; `None` accepts any literal.
    const EXPECTED: Option<&'static str>;

    fn from_constant(constant: &Constant) -> Result<Self, ShapeMismatch>;
}

fn mismatch<T: FromConstant>(constant: &Constant) -> ShapeMismatch {
    ShapeMismatch {
        expected: T::EXPECTED.unwrap_or("constant"),
        actual: constant.type_name(),
    }
}

impl FromConstant for String {
    const EXPECTED: Option<&'static str> = Some("str");

    fn from_constant(constant: &Constant) -> Result<Self, ShapeMismatch> {
        match constant {
            Constant::Str(s) => Ok(s.clone()),
            _ => Err(mismatch::<Self>(constant)),
        }
    }
}

impl FromConstant for i64 {
    const EXPECTED: Option<&'static str> = Some("int");

    fn from_constant(constant: &Constant) -> Result<Self, ShapeMismatch> {
        match constant {
            Constant::Int(i) => Ok(*i),
            _ => Err(mismatch::<Self>(constant)),
        }
    }
}

impl FromConstant for f64 {
    const EXPECTED: Option<&'static str> = Some("float");

    fn from_constant(constant: &Constant) -> Result<Self, ShapeMismatch> {
        match constant {
            Constant::Float(x) => Ok(*x),
            _ => Err(mismatch::<Self>(constant)),
        }
    }
}

impl FromConstant for bool {
    const EXPECTED: Option<&'static str> = Some("bool");

    fn from_constant(constant: &Constant) -> Result<Self, ShapeMismatch> {
        match constant {
            Constant::Bool(b) => Ok(*b),
            _ => Err(mismatch::<Self>(constant)),
        }
    }
}

impl FromConstant for Constant {
    const EXPECTED: Option<&'static str> = None;

    fn from_constant(constant: &Constant) -> Result<Self, ShapeMismatch> {
        Ok(constant.clone())
    }
}

/// A tuple whose elements all extract as `T`. The first element that does
/// not is the one reported.
impl<T: FromConstant> FromConstant for Vec<T> {
    const EXPECTED: Option<&'static str> = Some("tuple");

    fn from_constant(constant: &Constant) -> Result<Self, ShapeMismatch> {
        match constant {
            Constant::Tuple(items) => items.iter().map(T::from_constant).collect(),
            _ => Err(mismatch::<Self>(constant)),
        }
    }
}

/// Extract the literal held by a single-binding variable.
///
/// Fails with [`AnalysisError::NotAtomic`] when the variable has several
/// bindings and with [`AnalysisError::TypeMismatch`] when the value is not a
/// literal of the requested type.
pub fn get_atomic_constant<T: FromConstant>(var: &Variable) -> AnalysisResult<T> {
    let value = var.get_atomic_value()?;
    let Value::Constant(constant) = value else {
        let expected = T::EXPECTED.unwrap_or("constant");
        return Err(AnalysisError::type_mismatch(expected, value.type_name()));
    };
    Ok(T::from_constant(constant)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::ClassId;
    use pretty_assertions::assert_eq;

    fn int(i: i64) -> Value {
        Value::constant(i)
    }

    #[test]
    fn test_join_empty_is_any() {
        assert_eq!(join_values(vec![]), Value::Any);
    }

    #[test]
    fn test_join_single_is_identity() {
        assert_eq!(join_values(vec![int(1)]), int(1));
        assert_eq!(join_values(vec![int(1), int(1)]), int(1));
    }

    #[test]
    fn test_join_flattens_and_dedupes() {
        let inner = join_values(vec![int(1), int(2)]);
        let joined = join_values(vec![int(3), inner, int(1), Value::constant("a")]);
        let Value::Union(union) = joined else {
            panic!("expected a union");
        };
        assert_eq!(
            union.members(),
            &[int(3), int(1), int(2), Value::constant("a")]
        );
    }

    #[test]
    fn test_join_keeps_any_as_member() {
        let joined = join_values(vec![Value::Any, Value::FrozenInstance(ClassId::from_index(0))]);
        assert_eq!(joined.kind(), crate::values::ValueKind::Union);
    }

    #[test]
    fn test_get_atomic_constant() {
        let var = Value::constant("hello").to_variable();
        assert_eq!(get_atomic_constant::<String>(&var), Ok("hello".to_string()));
        assert_eq!(
            get_atomic_constant::<Constant>(&var),
            Ok(Constant::from("hello"))
        );
    }

    #[test]
    fn test_get_atomic_constant_type_mismatch() {
        let var = Value::constant("hello").to_variable();
        let err = get_atomic_constant::<i64>(&var).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("int"), "{}", message);
        assert!(message.contains("str"), "{}", message);
    }

    #[test]
    fn test_get_atomic_constant_tuple_of_str() {
        let var = Value::Constant(Constant::Tuple(vec![
            Constant::from("a"),
            Constant::from("b"),
        ]))
        .to_variable();
        assert_eq!(
            get_atomic_constant::<Vec<String>>(&var),
            Ok(vec!["a".to_string(), "b".to_string()])
        );

        let err = get_atomic_constant::<Vec<String>>(&Value::constant("x").to_variable())
            .unwrap_err();
        assert_eq!(
            err,
            AnalysisError::TypeMismatch {
                expected: "tuple".into(),
                actual: "str".into()
            }
        );
    }

    #[test]
    fn test_get_atomic_constant_reports_offending_element() {
        let var = Value::Constant(Constant::Tuple(vec![
            Constant::from("a"),
            Constant::Int(1),
        ]))
        .to_variable();
        let err = get_atomic_constant::<Vec<String>>(&var).unwrap_err();
        assert_eq!(err.to_string(), "expected str, got int");
    }

    #[test]
    fn test_get_atomic_constant_not_atomic() {
        let var = Variable::from_values(vec![int(1), int(2)]);
        assert_eq!(
            get_atomic_constant::<i64>(&var),
            Err(AnalysisError::NotAtomic { count: 2 })
        );
    }

    #[test]
    fn test_get_atomic_constant_non_literal() {
        let var = Value::Any.to_variable();
        assert_eq!(
            get_atomic_constant::<String>(&var),
            Err(AnalysisError::TypeMismatch {
                expected: "str".into(),
                actual: "Any".into()
            })
        );
    }
}
