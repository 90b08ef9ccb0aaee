//! Assembling a [`TypeDeclUnit`] from loose definitions.

use crate::error::PytdError;
use crate::nodes::{Definition, Type, TypeDeclUnit};
use std::collections::HashMap;

/// Sort definitions into a unit named `name`.
///
/// Constants sharing a name have their types joined and functions sharing a
/// name have their signatures concatenated, keeping the position of the
/// first occurrence. Two classes with the same name, or a name used by two
/// different kinds of definition, are errors.
pub fn wrap_type_decl_unit(
    name: &str,
    defs: impl IntoIterator<Item = Definition>,
) -> Result<TypeDeclUnit, PytdError> {
    let mut unit = TypeDeclUnit {
        name: name.to_string(),
        ..TypeDeclUnit::default()
    };
    // name -> kind tag of the first definition seen
    let mut kinds: HashMap<String, &'static str> = HashMap::new();

    for def in defs {
        let kind = match &def {
            Definition::Constant(_) => "constant",
            Definition::Function(_) => "function",
            Definition::Class(_) => "class",
        };
        match kinds.get(def.name()).copied() {
            Some(existing) if existing != kind => {
                return Err(PytdError::NameConflict {
                    name: def.name().to_string(),
                    first: existing,
                    second: kind,
                });
            }
            Some(_) => {}
            None => {
                kinds.insert(def.name().to_string(), kind);
            }
        }

        match def {
            Definition::Constant(constant) => {
                if let Some(existing) =
                    unit.constants.iter_mut().find(|c| c.name == constant.name)
                {
                    existing.ty = Type::union([existing.ty.clone(), constant.ty]);
                } else {
                    unit.constants.push(constant);
                }
            }
            Definition::Function(function) => {
                if let Some(existing) =
                    unit.functions.iter_mut().find(|f| f.name == function.name)
                {
                    for sig in function.signatures {
                        if !existing.signatures.contains(&sig) {
                            existing.signatures.push(sig);
                        }
                    }
                } else {
                    unit.functions.push(function);
                }
            }
            Definition::Class(class) => {
                if unit.classes.iter().any(|c| c.name == class.name) {
                    return Err(PytdError::DuplicateClass { name: class.name });
                }
                unit.classes.push(class);
            }
        }
    }
    Ok(unit)
}
