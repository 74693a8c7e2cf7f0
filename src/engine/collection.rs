use log::trace;
use crate::context::CollectionKey;
use crate::core::{OrmError, Result, Value};
use crate::instance::{ObjectValue, PersistentCollection};
use crate::metamodel::{CollectionClassification, CollectionIndex, PersistentCollectionDescriptor};
use crate::processing::LoadingCollectionEntry;
use crate::shape::{Fetch, FrameId, PluralFetch};
use super::{FrameState, RowProcessingState};

impl RowProcessingState<'_> {
    /// Joined collection of the entity in `owner`. One wrapper exists per
    /// collection and owner key for the whole traversal; every row that
    /// carries an element adds it.
    pub(crate) fn assemble_plural(&mut self, fetch: &PluralFetch, owner: FrameId) -> Result<ObjectValue> {
        if let Some(value) = self.frames.collection(fetch.frame) {
            return Ok(value.clone());
        }
        let owner_frame = self.frame(owner)?;
        let Some(owner_key) = owner_frame.key.clone() else {
            return Ok(ObjectValue::Null);
        };
        let owner_state = owner_frame.state;

        let model = self.model;
        let descriptor = model.collection(fetch.collection);
        let is_array = descriptor.classification.is_array();
        // Arrays are part of the owner's state, which a managed owner does not re-read.
        if is_array && owner_state == FrameState::FoundInContext {
            return Ok(ObjectValue::Null);
        }

        let key = CollectionKey::new(fetch.collection, owner_key.identifier().clone());
        let loading = self
            .processing
            .loading_collection(&key)
            .map(|entry| entry.collection.clone());
        let existing = self
            .context
            .get_collection(&key)
            .or_else(|| self.processing.delayed_collection(&key).cloned());
        let (wrapper, populate) = match (loading, existing) {
            (Some(loading), _) => (loading, true),
            (None, Some(existing)) if existing.was_initialized() && !self.options.refresh => (existing, false),
            (None, existing) => {
                // Rows fill a fresh wrapper. A managed owner keeps the wrapper
                // it already holds, which takes the contents at finish_up;
                // a reloaded owner gets the fresh one.
                let refill = existing.filter(|_| owner_state == FrameState::FoundInContext);
                let wrapper = PersistentCollection::new(
                    descriptor.role.clone(),
                    fetch.collection,
                    descriptor.classification,
                    Some(key.owner_key.clone()),
                );
                self.processing.register_loading_collection(LoadingCollectionEntry {
                    key: key.clone(),
                    collection: wrapper.clone(),
                    owner: owner_key,
                    position: fetch.position,
                    is_array,
                    refill,
                });
                (wrapper, true)
            }
        };

        if populate {
            self.add_element(fetch, descriptor, &wrapper, owner)?;
        }
        let value = ObjectValue::Collection(wrapper);
        self.frames.set_collection(fetch.frame, value.clone());
        Ok(value)
    }

    fn add_element(
        &mut self,
        fetch: &PluralFetch,
        descriptor: &PersistentCollectionDescriptor,
        wrapper: &PersistentCollection,
        owner: FrameId,
    ) -> Result<()> {
        // An outer-joined owner without elements yields null key columns.
        if self.read_all(&fetch.key)?.iter().all(Value::is_null) {
            return Ok(());
        }
        let element = self.assemble_fetch(&fetch.element, owner)?;
        if element.is_null() && matches!(fetch.element.as_ref(), Fetch::Entity(_)) {
            return Ok(());
        }

        match descriptor.classification {
            CollectionClassification::List | CollectionClassification::Array => {
                let position = self.list_position(fetch, descriptor, owner)?;
                if wrapper.get(position).is_none_or(|existing| existing.is_null()) {
                    wrapper.put_at(position, element);
                }
            }
            CollectionClassification::Set => {
                if !wrapper.contains(&element) {
                    wrapper.append(element);
                }
            }
            CollectionClassification::Map => {
                let index = fetch.index.as_ref().ok_or_else(|| missing_index(descriptor))?;
                let map_key = self.assemble_fetch(index, owner)?;
                if map_key.is_null() {
                    return Err(OrmError::ResultSetError(format!(
                        "Null map key in collection '{}'",
                        descriptor.role
                    )));
                }
                if wrapper.get_by_key(&map_key).is_none() {
                    wrapper.put_entry(map_key, element);
                }
            }
            CollectionClassification::Bag => {
                let repeated_entity = matches!(element, ObjectValue::Entity(_)) && wrapper.contains(&element);
                if !repeated_entity {
                    wrapper.append(element);
                }
            }
            CollectionClassification::IdBag => {
                let selection = fetch.identifier.as_ref().ok_or_else(|| {
                    OrmError::mapping(format!("Id-bag '{}' has no identifier column", descriptor.role))
                })?;
                let identifier = self.read(selection)?;
                if !identifier.is_null() && !wrapper.contains_identifier(&identifier) {
                    wrapper.put_identified(identifier, element);
                }
            }
        }
        trace!("Collection {} now holds {} elements", descriptor.role, wrapper.len());
        Ok(())
    }

    /// Zero-based slot of the current row's element, with the index base
    /// removed. Indexes below the base or above the session's cap are
    /// rejected rather than allocated.
    fn list_position(
        &mut self,
        fetch: &PluralFetch,
        descriptor: &PersistentCollectionDescriptor,
        owner: FrameId,
    ) -> Result<usize> {
        let index = fetch.index.as_ref().ok_or_else(|| missing_index(descriptor))?;
        let raw = self
            .assemble_fetch(index, owner)?
            .as_basic()
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                OrmError::ResultSetError(format!("Null or non-integer index in collection '{}'", descriptor.role))
            })?;
        let base = match &descriptor.index {
            Some(CollectionIndex::Basic { base, .. }) => *base,
            _ => 0,
        };
        let position = raw
            .checked_sub(base)
            .and_then(|position| usize::try_from(position).ok())
            .ok_or_else(|| {
                OrmError::ResultSetError(format!(
                    "Index {} of collection '{}' is below its base {}",
                    raw, descriptor.role, base
                ))
            })?;
        let max = self.options.max_collection_index;
        if position > max {
            return Err(OrmError::ResultSetError(format!(
                "Index {} of collection '{}' exceeds the maximum of {}",
                raw, descriptor.role, max
            )));
        }
        Ok(position)
    }
}

fn missing_index(descriptor: &PersistentCollectionDescriptor) -> OrmError {
    OrmError::mapping(format!("Indexed collection '{}' has no index fetch", descriptor.role))
}
