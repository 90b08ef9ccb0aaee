//! Container values.
//!
//! Each container is either concrete (contents known element by element) or
//! indefinite (contents unknown).

use super::utils::get_atomic_constant;
use crate::error::AnalysisResult;
use crate::flow::Variable;
use indexmap::IndexMap;

/// A `tuple` value.
#[derive(Clone, Debug, PartialEq)]
pub struct Tuple {
    elements: Option<Vec<Variable>>,
}

impl Tuple {
    pub fn new(elements: Vec<Variable>) -> Self {
        Self {
            elements: Some(elements),
        }
    }

    pub fn indefinite() -> Self {
        Self { elements: None }
    }

    pub fn elements(&self) -> Option<&[Variable]> {
        self.elements.as_deref()
    }

    pub fn is_indefinite(&self) -> bool {
        self.elements.is_none()
    }
}

/// A `list` value.
#[derive(Clone, Debug, PartialEq)]
pub struct List {
    elements: Option<Vec<Variable>>,
}

impl List {
    pub fn new(elements: Vec<Variable>) -> Self {
        Self {
            elements: Some(elements),
        }
    }

    pub fn indefinite() -> Self {
        Self { elements: None }
    }

    pub fn elements(&self) -> Option<&[Variable]> {
        self.elements.as_deref()
    }

    pub fn is_indefinite(&self) -> bool {
        self.elements.is_none()
    }
}

/// A `dict` value. Keys are variables, in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct Dict {
    entries: Option<Vec<(Variable, Variable)>>,
}

impl Dict {
    pub fn new(entries: Vec<(Variable, Variable)>) -> Self {
        Self {
            entries: Some(entries),
        }
    }

    pub fn indefinite() -> Self {
        Self { entries: None }
    }

    pub fn entries(&self) -> Option<&[(Variable, Variable)]> {
        self.entries.as_deref()
    }

    pub fn is_indefinite(&self) -> bool {
        self.entries.is_none()
    }

    /// Convert to a keyword-argument mapping.
    ///
    /// Fails unless every key is a single string literal.
    pub fn to_function_arg_dict(&self) -> AnalysisResult<FunctionArgDict> {
        let Some(entries) = &self.entries else {
            return Ok(FunctionArgDict::indefinite());
        };
        let mut mapping = IndexMap::new();
        for (key, value) in entries {
            let name: String = get_atomic_constant(key)?;
            mapping.insert(name, value.clone());
        }
        Ok(FunctionArgDict::new(mapping))
    }
}

/// Positional arguments gathered from a `*args` expansion.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionArgTuple {
    elements: Option<Vec<Variable>>,
}

impl FunctionArgTuple {
    pub fn new(elements: Vec<Variable>) -> Self {
        Self {
            elements: Some(elements),
        }
    }

    pub fn indefinite() -> Self {
        Self { elements: None }
    }

    pub fn elements(&self) -> Option<&[Variable]> {
        self.elements.as_deref()
    }

    pub fn into_elements(self) -> Option<Vec<Variable>> {
        self.elements
    }

    pub fn is_indefinite(&self) -> bool {
        self.elements.is_none()
    }
}

/// Keyword arguments gathered from a `**kwargs` expansion.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionArgDict {
    entries: Option<IndexMap<String, Variable>>,
}

impl FunctionArgDict {
    pub fn new(entries: IndexMap<String, Variable>) -> Self {
        Self {
            entries: Some(entries),
        }
    }

    pub fn indefinite() -> Self {
        Self { entries: None }
    }

    pub fn entries(&self) -> Option<&IndexMap<String, Variable>> {
        self.entries.as_ref()
    }

    pub fn into_entries(self) -> Option<IndexMap<String, Variable>> {
        self.entries
    }

    pub fn is_indefinite(&self) -> bool {
        self.entries.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalysisError;
    use crate::values::Value;

    #[test]
    fn test_dict_to_function_arg_dict() {
        let dict = Dict::new(vec![
            (Value::constant("a").to_variable(), Value::constant(1i64).to_variable()),
            (Value::constant("b").to_variable(), Value::Any.to_variable()),
        ]);
        let args = dict.to_function_arg_dict().unwrap();
        let entries = args.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["a"], Value::constant(1i64).to_variable());
    }

    #[test]
    fn test_dict_with_non_string_key() {
        let dict = Dict::new(vec![(
            Value::constant(1i64).to_variable(),
            Value::Any.to_variable(),
        )]);
        assert_eq!(
            dict.to_function_arg_dict(),
            Err(AnalysisError::TypeMismatch {
                expected: "str".into(),
                actual: "int".into()
            })
        );
    }

    #[test]
    fn test_indefinite_dict_converts_to_indefinite() {
        assert!(Dict::indefinite()
            .to_function_arg_dict()
            .unwrap()
            .is_indefinite());
    }
}
