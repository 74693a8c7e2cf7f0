//! Session-scoped identity map: managed entities, their entries, proxies,
//! collections, the batch-fetch queue and the natural-id cross reference.

pub mod batch;
pub mod entry;
pub mod key;

use log::debug;
use std::collections::{HashMap, HashSet};
use crate::core::{Identifier, Value};
use crate::instance::{EntityInstance, EntityProxy, PersistentCollection};
use crate::metamodel::ManagedTypeId;

pub use batch::BatchFetchQueue;
pub use entry::{EntityEntry, Status};
pub use key::{CollectionKey, EntityKey};

/// Entry and lookup contract the row-processing engine reports into.
pub trait PersistenceContext {
    fn get_entity(&self, key: &EntityKey) -> Option<EntityInstance>;

    fn contains_entity(&self, key: &EntityKey) -> bool {
        self.get_entity(key).is_some()
    }

    fn add_entity(&mut self, key: EntityKey, instance: EntityInstance);

    fn get_entry(&self, key: &EntityKey) -> Option<&EntityEntry>;

    fn get_entry_mut(&mut self, key: &EntityKey) -> Option<&mut EntityEntry>;

    fn add_entry(&mut self, entry: EntityEntry);

    fn get_proxy(&self, key: &EntityKey) -> Option<EntityProxy>;

    fn add_proxy(&mut self, proxy: EntityProxy);

    fn get_collection(&self, key: &CollectionKey) -> Option<PersistentCollection>;

    fn add_collection(&mut self, key: CollectionKey, collection: PersistentCollection);

    fn batch_fetch_queue(&mut self) -> &mut BatchFetchQueue;

    /// Record that `natural_id` values of an entity in hierarchy `root` map to `identifier`.
    fn cache_natural_id_resolution(&mut self, root: ManagedTypeId, natural_id: Vec<Value>, identifier: Identifier);

    fn find_natural_id_resolution(&self, root: ManagedTypeId, natural_id: &[Value]) -> Option<Identifier>;

    /// Whether the entity was inserted by the current transaction; its cache
    /// entry must then be updated rather than put from load.
    fn was_inserted_during_transaction(&self, key: &EntityKey) -> bool;

    fn is_default_read_only(&self) -> bool;
}

/// In-memory persistence context owned by one session.
#[derive(Debug, Default)]
pub struct StatefulPersistenceContext {
    entities: HashMap<EntityKey, EntityInstance>,
    entries: HashMap<EntityKey, EntityEntry>,
    proxies: HashMap<EntityKey, EntityProxy>,
    collections: HashMap<CollectionKey, PersistentCollection>,
    batch_fetch_queue: BatchFetchQueue,
    natural_ids: HashMap<(ManagedTypeId, Vec<Value>), Identifier>,
    inserted: HashSet<EntityKey>,
    default_read_only: bool,
}

impl StatefulPersistenceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_read_only(mut self, read_only: bool) -> Self {
        self.default_read_only = read_only;
        self
    }

    pub fn set_default_read_only(&mut self, read_only: bool) {
        self.default_read_only = read_only;
    }

    /// Mark an entity as inserted by the running transaction.
    pub fn register_insert(&mut self, key: EntityKey) {
        self.inserted.insert(key);
    }

    /// Forget transaction-scoped bookkeeping at commit or rollback.
    pub fn end_transaction(&mut self) {
        self.inserted.clear();
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &EntityEntry> {
        self.entries.values()
    }

    /// Evict everything. Property values of managed objects are dropped so
    /// that reference cycles between instances do not outlive the context.
    pub fn clear(&mut self) {
        debug!(
            "Clearing persistence context: {} entities, {} collections, {} proxies",
            self.entities.len(),
            self.collections.len(),
            self.proxies.len()
        );
        for instance in self.entities.values() {
            instance.clear_state();
        }
        for collection in self.collections.values() {
            collection.clear_contents();
        }
        self.entities.clear();
        self.entries.clear();
        self.proxies.clear();
        self.collections.clear();
        self.batch_fetch_queue.clear();
        self.natural_ids.clear();
        self.inserted.clear();
    }
}

impl PersistenceContext for StatefulPersistenceContext {
    fn get_entity(&self, key: &EntityKey) -> Option<EntityInstance> {
        self.entities.get(key).cloned()
    }

    fn add_entity(&mut self, key: EntityKey, instance: EntityInstance) {
        self.entities.insert(key, instance);
    }

    fn get_entry(&self, key: &EntityKey) -> Option<&EntityEntry> {
        self.entries.get(key)
    }

    fn get_entry_mut(&mut self, key: &EntityKey) -> Option<&mut EntityEntry> {
        self.entries.get_mut(key)
    }

    fn add_entry(&mut self, entry: EntityEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    fn get_proxy(&self, key: &EntityKey) -> Option<EntityProxy> {
        self.proxies.get(key).cloned()
    }

    fn add_proxy(&mut self, proxy: EntityProxy) {
        self.proxies.insert(proxy.key().clone(), proxy);
    }

    fn get_collection(&self, key: &CollectionKey) -> Option<PersistentCollection> {
        self.collections.get(key).cloned()
    }

    fn add_collection(&mut self, key: CollectionKey, collection: PersistentCollection) {
        self.collections.insert(key, collection);
    }

    fn batch_fetch_queue(&mut self) -> &mut BatchFetchQueue {
        &mut self.batch_fetch_queue
    }

    fn cache_natural_id_resolution(&mut self, root: ManagedTypeId, natural_id: Vec<Value>, identifier: Identifier) {
        self.natural_ids.insert((root, natural_id), identifier);
    }

    fn find_natural_id_resolution(&self, root: ManagedTypeId, natural_id: &[Value]) -> Option<Identifier> {
        self.natural_ids.get(&(root, natural_id.to_vec())).cloned()
    }

    fn was_inserted_during_transaction(&self, key: &EntityKey) -> bool {
        self.inserted.contains(key)
    }

    fn is_default_read_only(&self) -> bool {
        self.default_read_only
    }
}
