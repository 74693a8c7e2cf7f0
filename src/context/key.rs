use std::fmt;
use std::hash::{Hash, Hasher};
use crate::core::Identifier;
use crate::metamodel::{CollectionId, ManagedTypeId};

/// Identity of an entity within one persistence context.
///
/// Two keys are equal when they share the identifier and the hierarchy root:
/// a reference typed as the root and the loaded subclass instance are the
/// same entity.
#[derive(Debug, Clone)]
pub struct EntityKey {
    identifier: Identifier,
    root_entity: ManagedTypeId,
    entity: ManagedTypeId,
    entity_name: String,
}

impl EntityKey {
    pub fn new(identifier: Identifier, root_entity: ManagedTypeId, entity: ManagedTypeId, entity_name: &str) -> Self {
        Self {
            identifier,
            root_entity,
            entity,
            entity_name: entity_name.to_string(),
        }
    }

    pub fn identifier(&self) -> &Identifier {
        &self.identifier
    }

    pub fn root_entity(&self) -> ManagedTypeId {
        self.root_entity
    }

    /// Entity the key was created for; the concrete type once a row resolved it.
    pub fn entity(&self) -> ManagedTypeId {
        self.entity
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }
}

impl PartialEq for EntityKey {
    fn eq(&self, other: &Self) -> bool {
        self.root_entity == other.root_entity && self.identifier == other.identifier
    }
}

impl Eq for EntityKey {}

impl Hash for EntityKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root_entity.hash(state);
        self.identifier.hash(state);
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity_name, self.identifier)
    }
}

/// Identity of one collection instance: the collection role plus owner key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    pub collection: CollectionId,
    pub owner_key: Identifier,
}

impl CollectionKey {
    pub fn new(collection: CollectionId, owner_key: Identifier) -> Self {
        Self { collection, owner_key }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "collection#{}[{}]", self.collection.index(), self.owner_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use std::collections::HashSet;

    #[test]
    fn test_key_equality_ignores_concrete_type() {
        let root = ManagedTypeId(0);
        let id = Identifier::Simple(Value::Integer(7));
        let as_root = EntityKey::new(id.clone(), root, root, "Animal");
        let as_dog = EntityKey::new(id, root, ManagedTypeId(1), "Dog");
        assert_eq!(as_root, as_dog);

        let mut keys = HashSet::new();
        keys.insert(as_root);
        assert!(keys.contains(&as_dog));
        assert_eq!(as_dog.to_string(), "Dog#7");
    }

    #[test]
    fn test_keys_of_other_hierarchies_differ() {
        let id = Identifier::Simple(Value::Integer(1));
        let a = EntityKey::new(id.clone(), ManagedTypeId(0), ManagedTypeId(0), "A");
        let b = EntityKey::new(id, ManagedTypeId(2), ManagedTypeId(2), "B");
        assert_ne!(a, b);
    }
}
