use crate::error::{AnalysisError, AnalysisResult};
use crate::values::{join_values, Value, ValueKind};

/// Where a binding was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Created by the analyzer itself: globals, placeholders, joins.
    Synthetic,
    /// Produced by an instruction on this source line.
    Line(u32),
}

/// One possible value of a variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Binding {
    pub value: Value,
    pub origin: Origin,
}

/// The set of values a name or stack slot may hold.
///
/// Never empty. Bindings hold distinct values and keep the order they were
/// added in; two variables are equal when their values are.
#[derive(Clone, Debug)]
pub struct Variable {
    bindings: Vec<Binding>,
}

impl Variable {
    pub fn from_value(value: Value) -> Self {
        Self::from_value_at(value, Origin::Synthetic)
    }

    pub fn from_value_at(value: Value, origin: Origin) -> Self {
        Self {
            bindings: vec![Binding { value, origin }],
        }
    }

    /// A variable holding each distinct value once. No values gives `Any`.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let mut var = Self { bindings: Vec::new() };
        for value in values {
            var.add_binding(Binding {
                value,
                origin: Origin::Synthetic,
            });
        }
        if var.bindings.is_empty() {
            return Self::from_value(Value::Any);
        }
        var
    }

    /// Union of the bindings of several variables.
    pub fn merge<'a>(vars: impl IntoIterator<Item = &'a Variable>) -> Self {
        let mut merged = Self { bindings: Vec::new() };
        for var in vars {
            for binding in &var.bindings {
                merged.add_binding(binding.clone());
            }
        }
        if merged.bindings.is_empty() {
            return Self::from_value(Value::Any);
        }
        merged
    }

    /// Add the bindings of `other` to this variable.
    pub fn merge_from(&mut self, other: &Variable) {
        for binding in &other.bindings {
            self.add_binding(binding.clone());
        }
    }

    fn add_binding(&mut self, binding: Binding) {
        if !self.bindings.iter().any(|b| b.value == binding.value) {
            self.bindings.push(binding);
        }
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.bindings.iter().map(|b| &b.value)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn is_atomic(&self) -> bool {
        self.bindings.len() == 1
    }

    /// The single value of an atomic variable.
    pub fn get_atomic_value(&self) -> AnalysisResult<&Value> {
        match self.bindings.as_slice() {
            [binding] => Ok(&binding.value),
            bindings => Err(AnalysisError::NotAtomic {
                count: bindings.len(),
            }),
        }
    }

    /// The single value of an atomic variable, which must be of `kind`.
    pub fn get_atomic_value_of(&self, kind: ValueKind) -> AnalysisResult<&Value> {
        let value = self.get_atomic_value()?;
        if value.kind() != kind {
            return Err(AnalysisError::type_mismatch(kind.name(), value.type_name()));
        }
        Ok(value)
    }

    pub fn has_atomic_value(&self, value: &Value) -> bool {
        matches!(self.bindings.as_slice(), [binding] if binding.value == *value)
    }

    /// All values joined into one.
    pub fn joined_value(&self) -> Value {
        join_values(self.values().cloned())
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.values().eq(other.values())
    }
}
