use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use crate::context::EntityKey;
use super::EntityInstance;

struct ProxyData {
    entity_name: String,
    key: EntityKey,
    implementation: RefCell<Option<EntityInstance>>,
}

/// Lazy to-one reference standing in for an entity that has not been loaded.
/// Bound to the real instance once the entity is loaded in the same
/// persistence context.
#[derive(Clone)]
pub struct EntityProxy(Rc<ProxyData>);

impl EntityProxy {
    pub fn new(entity_name: &str, key: EntityKey) -> Self {
        Self(Rc::new(ProxyData {
            entity_name: entity_name.to_string(),
            key,
            implementation: RefCell::new(None),
        }))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn entity_name(&self) -> &str {
        &self.0.entity_name
    }

    pub fn key(&self) -> &EntityKey {
        &self.0.key
    }

    pub fn is_uninitialized(&self) -> bool {
        self.0.implementation.borrow().is_none()
    }

    pub fn implementation(&self) -> Option<EntityInstance> {
        self.0.implementation.borrow().clone()
    }

    pub(crate) fn set_implementation(&self, instance: EntityInstance) {
        *self.0.implementation.borrow_mut() = Some(instance);
    }
}

impl Hash for EntityProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for EntityProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = if self.is_uninitialized() { "uninitialized" } else { "initialized" };
        write!(f, "{}#{}<proxy, {}>", self.0.entity_name, self.0.key.identifier(), state)
    }
}
