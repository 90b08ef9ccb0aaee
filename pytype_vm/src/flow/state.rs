use super::variables::Variable;
use crate::error::{AnalysisError, AnalysisResult};
use indexmap::IndexMap;

/// Locals and operand stack at the entry of a block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BlockState {
    pub locals: IndexMap<String, Variable>,
    pub stack: Vec<Variable>,
}

impl BlockState {
    pub fn new(locals: IndexMap<String, Variable>) -> Self {
        Self {
            locals,
            stack: Vec::new(),
        }
    }

    /// Join another incoming state into this one.
    ///
    /// Locals are merged name by name, a name bound on only one side keeps
    /// that side's bindings. Both stacks must have the same depth.
    pub fn merge(&mut self, other: BlockState) -> AnalysisResult<()> {
        if self.stack.len() != other.stack.len() {
            return Err(AnalysisError::InternalConsistency(format!(
                "stack depth mismatch at block entry: {} vs {}",
                self.stack.len(),
                other.stack.len()
            )));
        }
        for (slot, incoming) in self.stack.iter_mut().zip(&other.stack) {
            slot.merge_from(incoming);
        }
        for (name, incoming) in other.locals {
            match self.locals.get_mut(&name) {
                Some(existing) => existing.merge_from(&incoming),
                None => {
                    self.locals.insert(name, incoming);
                }
            }
        }
        Ok(())
    }
}
