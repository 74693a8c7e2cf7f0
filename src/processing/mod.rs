//! Scope of one result-set traversal: entities and collections being loaded,
//! the references staged for the persistence context, and the `finish_up`
//! pass that completes them.
//!
//! Rows never write to the persistence context. Everything a traversal
//! would register is held here and applied only once `finish_up` has run
//! every fallible step, so a failed traversal leaves the context as it was.

mod two_phase;

use log::debug;
use std::collections::HashMap;
use tracing::{Level, event, info_span};
use crate::config::SessionConfig;
use crate::context::{CollectionKey, EntityKey, PersistenceContext};
use crate::core::{Identifier, Result};
use crate::event::EventListenerRegistry;
use crate::instance::{EntityInstance, ObjectValue, PersistentCollection};
use crate::metamodel::{CollectionId, ManagedTypeId, RuntimeModel};

/// An entity instantiated by the current traversal whose state is not yet
/// injected. The first row that resolves it supplies the state.
#[derive(Debug)]
pub struct LoadingEntityEntry {
    pub key: EntityKey,
    /// Concrete type the row resolved to.
    pub entity: ManagedTypeId,
    pub instance: EntityInstance,
    pub(crate) state: Option<Vec<ObjectValue>>,
}

impl LoadingEntityEntry {
    pub fn has_state(&self) -> bool {
        self.state.is_some()
    }
}

/// A collection populated incrementally by the rows of the current traversal.
#[derive(Debug)]
pub struct LoadingCollectionEntry {
    pub key: CollectionKey,
    pub collection: PersistentCollection,
    /// Owner entity and the state-array slot holding the collection.
    pub owner: EntityKey,
    pub position: usize,
    pub is_array: bool,
    /// Wrapper a managed owner already holds; it receives the loaded
    /// contents at `finish_up` instead of `collection` replacing it.
    pub refill: Option<PersistentCollection>,
}

#[derive(Debug, Default)]
pub struct ProcessingState {
    loading_entities: HashMap<EntityKey, LoadingEntityEntry>,
    entity_order: Vec<EntityKey>,
    loading_collections: HashMap<CollectionId, HashMap<Identifier, LoadingCollectionEntry>>,
    collection_order: Vec<CollectionKey>,
    delayed_entities: HashMap<EntityKey, ObjectValue>,
    delayed_entity_order: Vec<EntityKey>,
    delayed_collections: HashMap<CollectionKey, PersistentCollection>,
    delayed_collection_order: Vec<CollectionKey>,
    batch_entity_keys: Vec<EntityKey>,
    batch_collection_keys: Vec<CollectionKey>,
    resolved_keys: Vec<EntityKey>,
}

impl ProcessingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loading_entity(&self, key: &EntityKey) -> Option<&LoadingEntityEntry> {
        self.loading_entities.get(key)
    }

    pub(crate) fn loading_entity_mut(&mut self, key: &EntityKey) -> Option<&mut LoadingEntityEntry> {
        self.loading_entities.get_mut(key)
    }

    /// Register an entity as loading. A second registration of the same key
    /// keeps the existing entry.
    pub fn register_loading_entity(
        &mut self,
        key: EntityKey,
        entity: ManagedTypeId,
        instance: EntityInstance,
    ) -> &LoadingEntityEntry {
        if self.loading_entities.contains_key(&key) {
            debug!("Entity {} is already loading; reusing its entry", key);
        } else {
            debug!("Registered loading entity {}", key);
            self.entity_order.push(key.clone());
        }
        self.loading_entities
            .entry(key.clone())
            .or_insert_with(|| LoadingEntityEntry {
                key,
                entity,
                instance,
                state: None,
            })
    }

    pub fn loading_collection(&self, key: &CollectionKey) -> Option<&LoadingCollectionEntry> {
        self.loading_collections
            .get(&key.collection)
            .and_then(|by_owner| by_owner.get(&key.owner_key))
    }

    /// Register a collection as loading; idempotent like entity registration.
    pub fn register_loading_collection(&mut self, entry: LoadingCollectionEntry) -> &LoadingCollectionEntry {
        let key = entry.key.clone();
        let by_owner = self.loading_collections.entry(key.collection).or_default();
        if by_owner.contains_key(&key.owner_key) {
            debug!("Collection {} is already loading; reusing its entry", key);
        } else {
            debug!("Registered loading collection {}", key);
            self.collection_order.push(key.clone());
        }
        by_owner.entry(key.owner_key).or_insert(entry)
    }

    pub fn loading_entity_count(&self) -> usize {
        self.loading_entities.len()
    }

    pub fn loading_collection_count(&self) -> usize {
        self.collection_order.len()
    }

    /// Proxy or uninitialized instance handed out for `key` by this traversal.
    pub fn delayed_entity(&self, key: &EntityKey) -> Option<&ObjectValue> {
        self.delayed_entities.get(key)
    }

    /// Uninitialized instance staged for `key`, which a later row may load in place.
    pub(crate) fn staged_instance(&self, key: &EntityKey) -> Option<EntityInstance> {
        self.delayed_entity(key).and_then(ObjectValue::as_entity).cloned()
    }

    /// Stage a delayed reference for registration at `finish_up`.
    pub(crate) fn stage_delayed_entity(&mut self, key: EntityKey, value: ObjectValue, batch_loadable: bool) {
        if self.delayed_entities.contains_key(&key) {
            return;
        }
        if batch_loadable {
            self.batch_entity_keys.push(key.clone());
        }
        self.delayed_entity_order.push(key.clone());
        self.delayed_entities.insert(key, value);
    }

    pub fn delayed_collection(&self, key: &CollectionKey) -> Option<&PersistentCollection> {
        self.delayed_collections.get(key)
    }

    pub(crate) fn stage_delayed_collection(
        &mut self,
        key: CollectionKey,
        collection: PersistentCollection,
        batch_loadable: bool,
    ) {
        if self.delayed_collections.contains_key(&key) {
            return;
        }
        if batch_loadable {
            self.batch_collection_keys.push(key.clone());
        }
        self.delayed_collection_order.push(key.clone());
        self.delayed_collections.insert(key, collection);
    }

    /// Note that a row resolved `key`; it leaves the batch-fetch queue at `finish_up`.
    pub(crate) fn note_resolved(&mut self, key: &EntityKey) {
        if !self.resolved_keys.contains(key) {
            self.resolved_keys.push(key.clone());
        }
    }

    fn take_collection(&mut self, key: &CollectionKey) -> Option<LoadingCollectionEntry> {
        self.loading_collections
            .get_mut(&key.collection)
            .and_then(|by_owner| by_owner.remove(&key.owner_key))
    }

    /// Complete the traversal: materialize arrays into their owners' state,
    /// run the two-phase load of every loading entity in registration order,
    /// then hand the remaining collections over to the persistence context.
    ///
    /// Listener callbacks and cache puts run before anything is registered.
    /// If one fails, instances that were rewritten in place get their
    /// previous contents back and the context is left unchanged.
    pub fn finish_up(
        mut self,
        model: &RuntimeModel,
        options: &SessionConfig,
        context: &mut dyn PersistenceContext,
        listeners: &EventListenerRegistry,
    ) -> Result<()> {
        let span = info_span!(
            "finish_up",
            entities = self.entity_order.len(),
            collections = self.collection_order.len()
        );
        let _enter = span.enter();

        let order = std::mem::take(&mut self.collection_order);
        let (arrays, collections): (Vec<CollectionKey>, Vec<CollectionKey>) = order
            .into_iter()
            .partition(|key| self.loading_collection(key).is_some_and(|entry| entry.is_array));

        for key in arrays {
            let Some(entry) = self.take_collection(&key) else {
                continue;
            };
            entry.collection.after_initialize();
            let values = entry.collection.elements();
            match self.loading_entities.get_mut(&entry.owner) {
                Some(LoadingEntityEntry { state: Some(state), .. }) if entry.position < state.len() => {
                    state[entry.position] = ObjectValue::Array(values);
                }
                _ => debug!("Array {} has no loading owner state; skipped", key),
            }
        }

        let mut prepared = Vec::with_capacity(self.entity_order.len());
        for key in std::mem::take(&mut self.entity_order) {
            let Some(entry) = self.loading_entities.remove(&key) else {
                continue;
            };
            match two_phase::prepare_entity(entry, model, options, context, listeners) {
                Ok(load) => prepared.push(load),
                Err(err) => {
                    two_phase::roll_back(prepared);
                    return Err(err);
                }
            }
        }
        if let Err(err) = two_phase::put_in_cache(&prepared, options, context) {
            two_phase::roll_back(prepared);
            return Err(err);
        }

        self.commit_delayed(context);
        let loaded = prepared.len();
        for load in prepared {
            two_phase::register_entity(load, context);
        }
        for key in std::mem::take(&mut self.resolved_keys) {
            context.batch_fetch_queue().remove_batch_loadable_entity_key(&key);
        }

        let mut finished = 0;
        for key in collections {
            let Some(entry) = self.take_collection(&key) else {
                continue;
            };
            let collection = match entry.refill {
                Some(target) => {
                    target.take_contents_from(&entry.collection);
                    target
                }
                None => {
                    entry.collection.after_initialize();
                    entry.collection
                }
            };
            context.batch_fetch_queue().remove_batch_loadable_collection(&entry.key);
            context.add_collection(entry.key, collection);
            finished += 1;
        }

        event!(Level::DEBUG, entities = loaded, collections = finished, "Finished loading");
        Ok(())
    }

    /// Register the proxies, uninitialized instances and delayed collections
    /// handed out during the rows, and queue the batch-loadable ones.
    fn commit_delayed(&mut self, context: &mut dyn PersistenceContext) {
        for key in std::mem::take(&mut self.delayed_entity_order) {
            match self.delayed_entities.remove(&key) {
                Some(ObjectValue::Entity(instance)) => context.add_entity(key, instance),
                Some(ObjectValue::Proxy(proxy)) => context.add_proxy(proxy),
                _ => {}
            }
        }
        for key in std::mem::take(&mut self.delayed_collection_order) {
            if let Some(collection) = self.delayed_collections.remove(&key) {
                context.add_collection(key, collection);
            }
        }
        let queue = context.batch_fetch_queue();
        for key in std::mem::take(&mut self.batch_entity_keys) {
            queue.add_batch_loadable_entity_key(key);
        }
        for key in std::mem::take(&mut self.batch_collection_keys) {
            queue.add_batch_loadable_collection(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::metamodel::CollectionClassification;
    use crate::metamodel::NavigableRole;

    fn key(id: i64) -> EntityKey {
        EntityKey::new(Identifier::Simple(Value::Integer(id)), ManagedTypeId(0), ManagedTypeId(0), "Node")
    }

    #[test]
    fn test_duplicate_entity_registration_reuses_entry() {
        let mut processing = ProcessingState::new();
        let first = EntityInstance::new("Node");
        processing.register_loading_entity(key(1), ManagedTypeId(0), first.clone());
        let again = processing.register_loading_entity(key(1), ManagedTypeId(0), EntityInstance::new("Node"));

        assert!(again.instance.ptr_eq(&first));
        assert_eq!(processing.loading_entity_count(), 1);
    }

    #[test]
    fn test_duplicate_collection_registration_reuses_entry() {
        let mut processing = ProcessingState::new();
        let owner = Identifier::Simple(Value::Integer(1));
        let collection_key = CollectionKey::new(CollectionId(0), owner.clone());
        let wrapper = || {
            PersistentCollection::new(
                NavigableRole::root("Node").append("tags"),
                CollectionId(0),
                CollectionClassification::Set,
                Some(owner.clone()),
            )
        };
        let first = wrapper();
        for collection in [first.clone(), wrapper()] {
            processing.register_loading_collection(LoadingCollectionEntry {
                key: collection_key.clone(),
                collection,
                owner: key(1),
                position: 0,
                is_array: false,
                refill: None,
            });
        }

        assert_eq!(processing.loading_collection_count(), 1);
        assert!(processing.loading_collection(&collection_key).unwrap().collection.ptr_eq(&first));
    }
}
