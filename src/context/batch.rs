use std::collections::HashMap;
use crate::metamodel::{CollectionId, ManagedTypeId};
use super::{CollectionKey, EntityKey};

/// Keys of lazy references that a later batch load may fetch together.
/// Insertion order is preserved so batches follow discovery order.
#[derive(Debug, Default)]
pub struct BatchFetchQueue {
    entity_keys: HashMap<ManagedTypeId, Vec<EntityKey>>,
    collection_keys: HashMap<CollectionId, Vec<CollectionKey>>,
}

impl BatchFetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a key under its hierarchy root. Re-adding a queued key is a no-op.
    pub fn add_batch_loadable_entity_key(&mut self, key: EntityKey) {
        let keys = self.entity_keys.entry(key.root_entity()).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn remove_batch_loadable_entity_key(&mut self, key: &EntityKey) {
        if let Some(keys) = self.entity_keys.get_mut(&key.root_entity()) {
            keys.retain(|queued| queued != key);
        }
    }

    pub fn contains_entity_key(&self, key: &EntityKey) -> bool {
        self.entity_keys
            .get(&key.root_entity())
            .is_some_and(|keys| keys.contains(key))
    }

    /// Up to `size` queued keys of the hierarchy rooted at `root`.
    pub fn entity_batch(&self, root: ManagedTypeId, size: usize) -> Vec<EntityKey> {
        self.entity_keys
            .get(&root)
            .map(|keys| keys.iter().take(size).cloned().collect())
            .unwrap_or_default()
    }

    pub fn add_batch_loadable_collection(&mut self, key: CollectionKey) {
        let keys = self.collection_keys.entry(key.collection).or_default();
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    pub fn remove_batch_loadable_collection(&mut self, key: &CollectionKey) {
        if let Some(keys) = self.collection_keys.get_mut(&key.collection) {
            keys.retain(|queued| queued != key);
        }
    }

    pub fn collection_batch(&self, collection: CollectionId, size: usize) -> Vec<CollectionKey> {
        self.collection_keys
            .get(&collection)
            .map(|keys| keys.iter().take(size).cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.entity_keys.clear();
        self.collection_keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Identifier, Value};

    fn key(id: i64) -> EntityKey {
        EntityKey::new(Identifier::Simple(Value::Integer(id)), ManagedTypeId(0), ManagedTypeId(0), "Node")
    }

    #[test]
    fn test_batches_keep_discovery_order_without_duplicates() {
        let mut queue = BatchFetchQueue::new();
        queue.add_batch_loadable_entity_key(key(3));
        queue.add_batch_loadable_entity_key(key(1));
        queue.add_batch_loadable_entity_key(key(3));
        queue.add_batch_loadable_entity_key(key(2));

        assert_eq!(queue.entity_batch(ManagedTypeId(0), 2), vec![key(3), key(1)]);

        queue.remove_batch_loadable_entity_key(&key(3));
        assert!(!queue.contains_entity_key(&key(3)));
        assert_eq!(queue.entity_batch(ManagedTypeId(0), 10).len(), 2);
    }
}
