use crate::core::{OrmError, Result};
use crate::instance::ObjectValue;
use crate::shape::{BasicFetch, CircularKind, CompositeFetch, EntityFetch, Fetch, FrameId};
use crate::metamodel::NotFoundAction;
use super::RowProcessingState;

impl RowProcessingState<'_> {
    /// Column value converted to its domain form.
    pub(crate) fn assemble_basic(&mut self, fetch: &BasicFetch) -> Result<ObjectValue> {
        let value = self.read(&fetch.selection)?;
        let value = match &fetch.converter {
            Some(converter) if !value.is_null() => converter.to_domain_value(value)?,
            _ => value,
        };
        Ok(ObjectValue::basic(value))
    }

    /// Value of one fetch of the entity held by `owner`.
    pub(crate) fn assemble_fetch(&mut self, fetch: &Fetch, owner: FrameId) -> Result<ObjectValue> {
        match fetch {
            Fetch::Basic(basic) => self.assemble_basic(basic),
            Fetch::Composite(composite) => self.assemble_composite(composite, owner),
            Fetch::Entity(entity) => self.assemble_joined_entity(entity),
            Fetch::DelayedEntity(delayed) => {
                let key = self.read_all(&delayed.key)?;
                self.resolve_delayed_entity(delayed.target, key)
            }
            Fetch::Circular(circular) => match circular.kind {
                CircularKind::Bidirectional => match circular.referenced_frame {
                    Some(frame) => Ok(self.frame(frame)?.value()),
                    None => Ok(ObjectValue::Null),
                },
                CircularKind::SelfReferencing => {
                    let key = self.read_all(&circular.key)?;
                    self.resolve_delayed_entity(circular.target, key)
                }
            },
            Fetch::Plural(plural) => self.assemble_plural(plural, owner),
            Fetch::DelayedCollection(delayed) => self.resolve_delayed_collection(delayed, owner),
        }
    }

    /// Embeddable value; null when every part is null.
    fn assemble_composite(&mut self, fetch: &CompositeFetch, owner: FrameId) -> Result<ObjectValue> {
        let model = self.model;
        let embeddable = model.managed_type(fetch.embeddable);
        let mut values = vec![ObjectValue::Null; embeddable.state_array_size()];
        for nested in &fetch.fetches {
            let value = self.assemble_fetch(nested, owner)?;
            if let Some(slot) = values.get_mut(nested.position()) {
                *slot = value;
            }
        }
        if values.iter().all(ObjectValue::is_null) {
            return Ok(ObjectValue::Null);
        }
        Ok(embeddable.representation.instantiate_composite(embeddable, values))
    }

    fn assemble_joined_entity(&mut self, fetch: &EntityFetch) -> Result<ObjectValue> {
        let value = self.assemble_entity(&fetch.entity)?;
        if value.is_null() && fetch.not_found == NotFoundAction::Exception {
            let key = self.read_all(&fetch.referring)?;
            if key.iter().any(|part| !part.is_null()) {
                let parts: Vec<String> = key.iter().map(ToString::to_string).collect();
                return Err(OrmError::ExecutionError(format!(
                    "No row with the given identifier exists for '{}': [{}]",
                    fetch.path,
                    parts.join(", ")
                )));
            }
        }
        Ok(value)
    }
}
