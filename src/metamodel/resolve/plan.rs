use std::collections::{HashMap, HashSet};
use crate::boot::{BootModel, ManagedTypeKindMapping, ManagedTypeMapping};
use crate::core::{OrmError, Result};

/// Dependency-ordered build plan: every entity and mapped superclass appears
/// after its supertypes. Embeddables are bound per usage and are only indexed.
#[derive(Debug)]
pub(crate) struct BuildPlan<'a> {
    pub ordered: Vec<&'a ManagedTypeMapping>,
    pub embeddables: HashMap<&'a str, &'a ManagedTypeMapping>,
}

impl<'a> BuildPlan<'a> {
    pub fn compute(boot: &'a BootModel) -> Result<Self> {
        let mut by_name: HashMap<&'a str, &'a ManagedTypeMapping> = HashMap::new();
        let mut embeddables = HashMap::new();
        for mapping in &boot.types {
            if by_name.insert(mapping.name.as_str(), mapping).is_some() {
                return Err(OrmError::mapping(format!(
                    "Managed type '{}' is mapped twice",
                    mapping.name
                )));
            }
            if mapping.kind == ManagedTypeKindMapping::Embeddable {
                if mapping.superclass.is_some() {
                    return Err(OrmError::mapping(format!(
                        "Embeddable '{}' cannot extend another type",
                        mapping.name
                    )));
                }
                embeddables.insert(mapping.name.as_str(), mapping);
            }
        }

        let mut ordered = Vec::new();
        let mut done = HashSet::new();
        let mut visiting = Vec::new();
        for mapping in &boot.types {
            if mapping.kind != ManagedTypeKindMapping::Embeddable {
                visit(mapping, &by_name, &mut visiting, &mut done, &mut ordered)?;
            }
        }

        Ok(Self { ordered, embeddables })
    }
}

fn visit<'a>(
    mapping: &'a ManagedTypeMapping,
    by_name: &HashMap<&'a str, &'a ManagedTypeMapping>,
    visiting: &mut Vec<&'a str>,
    done: &mut HashSet<&'a str>,
    ordered: &mut Vec<&'a ManagedTypeMapping>,
) -> Result<()> {
    let name = mapping.name.as_str();
    if done.contains(name) {
        return Ok(());
    }
    if visiting.contains(&name) {
        return Err(OrmError::mapping(format!(
            "Inheritance cycle: {} -> {}",
            visiting.join(" -> "),
            name
        )));
    }

    visiting.push(name);
    if let Some(superclass) = &mapping.superclass {
        let parent = by_name.get(superclass.as_str()).ok_or_else(|| {
            OrmError::mapping(format!("Unknown superclass '{}' of '{}'", superclass, name))
        })?;
        if parent.kind == ManagedTypeKindMapping::Embeddable {
            return Err(OrmError::mapping(format!(
                "'{}' cannot extend embeddable '{}'",
                name, superclass
            )));
        }
        visit(parent, by_name, visiting, done, ordered)?;
    }
    visiting.pop();

    done.insert(name);
    ordered.push(mapping);
    Ok(())
}
