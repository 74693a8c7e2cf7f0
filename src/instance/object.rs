use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use crate::core::{Identifier, OrmError, Result, Value};
use super::{EntityProxy, PersistentCollection};

/// A domain value held in a state array slot or an entity property.
#[derive(Clone)]
pub enum ObjectValue {
    Null,
    Basic(Value),
    Composite(CompositeValue),
    Entity(EntityInstance),
    Proxy(EntityProxy),
    Collection(PersistentCollection),
    Array(Vec<ObjectValue>),
}

impl ObjectValue {
    pub fn basic(value: impl Into<Value>) -> Self {
        match value.into() {
            Value::Null => Self::Null,
            other => Self::Basic(other),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_basic(&self) -> Option<&Value> {
        match self {
            Self::Basic(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&EntityInstance> {
        match self {
            Self::Entity(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeValue> {
        match self {
            Self::Composite(composite) => Some(composite),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&PersistentCollection> {
        match self {
            Self::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    /// Copy for a dirty-check snapshot: values owned by the slot are
    /// duplicated, references to other managed objects are shared.
    pub fn deep_copy(&self) -> Self {
        match self {
            Self::Composite(composite) => Self::Composite(CompositeValue {
                type_name: composite.type_name.clone(),
                values: composite.values.iter().map(Self::deep_copy).collect(),
            }),
            Self::Array(values) => Self::Array(values.iter().map(Self::deep_copy).collect()),
            other => other.clone(),
        }
    }

    /// Flatten a basic or composite value into raw identifier parts.
    pub fn to_identifier(&self) -> Result<Option<Identifier>> {
        match self {
            Self::Null => Ok(None),
            Self::Basic(value) => Ok(Identifier::simple(value.clone())),
            Self::Composite(composite) => {
                let parts = composite
                    .values
                    .iter()
                    .map(|v| match v {
                        Self::Null => Ok(Value::Null),
                        Self::Basic(value) => Ok(value.clone()),
                        other => Err(OrmError::TypeMismatch(format!(
                            "Identifier part must be basic, got {}",
                            other.kind_name()
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Identifier::composite(parts))
            }
            other => Err(OrmError::TypeMismatch(format!(
                "Value of kind {} cannot be used as an identifier",
                other.kind_name()
            ))),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Basic(_) => "basic",
            Self::Composite(_) => "composite",
            Self::Entity(_) => "entity",
            Self::Proxy(_) => "proxy",
            Self::Collection(_) => "collection",
            Self::Array(_) => "array",
        }
    }
}

/// References to managed objects compare by identity, values by content.
impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Basic(a), Self::Basic(b)) => a == b,
            (Self::Composite(a), Self::Composite(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => a.ptr_eq(b),
            (Self::Proxy(a), Self::Proxy(b)) => a.ptr_eq(b),
            (Self::Collection(a), Self::Collection(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ObjectValue {}

impl Hash for ObjectValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Basic(value) => value.hash(state),
            Self::Composite(composite) => composite.hash(state),
            Self::Entity(instance) => instance.hash(state),
            Self::Proxy(proxy) => proxy.hash(state),
            Self::Collection(collection) => collection.hash(state),
            Self::Array(values) => values.hash(state),
        }
    }
}

impl fmt::Debug for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "Null"),
            Self::Basic(value) => write!(f, "{}", value),
            Self::Composite(composite) => write!(f, "{:?}", composite),
            Self::Entity(instance) => write!(f, "{:?}", instance),
            Self::Proxy(proxy) => write!(f, "{:?}", proxy),
            Self::Collection(collection) => write!(f, "{:?}", collection),
            Self::Array(values) => f.debug_list().entries(values).finish(),
        }
    }
}

impl From<Value> for ObjectValue {
    fn from(value: Value) -> Self {
        Self::basic(value)
    }
}

/// Value of an embeddable: its attribute values in local state-array order.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CompositeValue {
    pub type_name: String,
    pub values: Vec<ObjectValue>,
}

impl CompositeValue {
    pub fn new(type_name: &str, values: Vec<ObjectValue>) -> Self {
        Self {
            type_name: type_name.to_string(),
            values,
        }
    }

    pub fn get(&self, position: usize) -> Option<&ObjectValue> {
        self.values.get(position)
    }

    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(ObjectValue::is_null)
    }
}

impl fmt::Debug for CompositeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_name)?;
        f.debug_list().entries(&self.values).finish()
    }
}

#[derive(Default, Clone)]
struct EntityData {
    entity_name: String,
    identifier: Option<ObjectValue>,
    properties: BTreeMap<String, ObjectValue>,
    initialized: bool,
}

/// Shared handle to a domain object.
///
/// Clones share the same underlying object; identity is pointer identity.
/// Handles are session-bound and not `Send`.
#[derive(Clone)]
pub struct EntityInstance(Rc<RefCell<EntityData>>);

impl EntityInstance {
    pub fn new(entity_name: &str) -> Self {
        Self(Rc::new(RefCell::new(EntityData {
            entity_name: entity_name.to_string(),
            ..EntityData::default()
        })))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn entity_name(&self) -> String {
        self.0.borrow().entity_name.clone()
    }

    pub fn identifier(&self) -> Option<ObjectValue> {
        self.0.borrow().identifier.clone()
    }

    pub fn set_identifier(&self, identifier: ObjectValue) {
        self.0.borrow_mut().identifier = Some(identifier);
    }

    pub fn get(&self, property: &str) -> Option<ObjectValue> {
        self.0.borrow().properties.get(property).cloned()
    }

    /// Basic property value, `Value::Null` when absent or not basic.
    pub fn get_value(&self, property: &str) -> Value {
        match self.get(property) {
            Some(ObjectValue::Basic(value)) => value,
            _ => Value::Null,
        }
    }

    pub fn set(&self, property: &str, value: ObjectValue) {
        self.0.borrow_mut().properties.insert(property.to_string(), value);
    }

    pub fn property_names(&self) -> Vec<String> {
        self.0.borrow().properties.keys().cloned().collect()
    }

    pub fn is_initialized(&self) -> bool {
        self.0.borrow().initialized
    }

    pub(crate) fn mark_initialized(&self) {
        self.0.borrow_mut().initialized = true;
    }

    /// Drop all property values, breaking reference cycles between objects.
    pub(crate) fn clear_state(&self) {
        self.0.borrow_mut().properties.clear();
    }

    /// Copy of the instance's current contents, for [`EntityInstance::restore`].
    pub(crate) fn save(&self) -> SavedInstance {
        SavedInstance(self.0.borrow().clone())
    }

    pub(crate) fn restore(&self, saved: SavedInstance) {
        *self.0.borrow_mut() = saved.0;
    }
}

/// Contents of an instance captured before a load rewrites it in place.
pub(crate) struct SavedInstance(EntityData);

impl Hash for EntityInstance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for EntityInstance {
    // Only the identity is printed; properties may form cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        match &data.identifier {
            Some(ObjectValue::Basic(id)) => write!(f, "{}#{}", data.entity_name, id),
            Some(other) => write!(f, "{}#{:?}", data.entity_name, other),
            None => write!(f, "{}#<transient>", data.entity_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_identity() {
        let a = EntityInstance::new("Point");
        let b = a.clone();
        let c = EntityInstance::new("Point");
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(ObjectValue::Entity(a.clone()), ObjectValue::Entity(b));
        assert_ne!(ObjectValue::Entity(a), ObjectValue::Entity(c));
    }

    #[test]
    fn test_hash_follows_reference_identity() {
        use std::collections::HashSet;

        let a = EntityInstance::new("Point");
        let mut seen = HashSet::new();
        assert!(seen.insert(vec![ObjectValue::Entity(a.clone()), ObjectValue::basic(1)]));
        assert!(!seen.insert(vec![ObjectValue::Entity(a), ObjectValue::basic(1)]));
        // Same contents, different instance
        assert!(seen.insert(vec![ObjectValue::Entity(EntityInstance::new("Point")), ObjectValue::basic(1)]));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_restore_undoes_in_place_rewrite() {
        let point = EntityInstance::new("Point");
        point.set("x", ObjectValue::basic(1));
        let saved = point.save();

        point.set("x", ObjectValue::basic(2));
        point.set_identifier(ObjectValue::basic(9));
        point.mark_initialized();
        point.restore(saved);

        assert_eq!(point.get_value("x"), Value::Integer(1));
        assert!(point.identifier().is_none());
        assert!(!point.is_initialized());
    }

    #[test]
    fn test_deep_copy_shares_references_but_not_values() {
        let target = EntityInstance::new("Node");
        let composite = ObjectValue::Composite(CompositeValue::new(
            "Address",
            vec![ObjectValue::basic("Main"), ObjectValue::Entity(target.clone())],
        ));
        let copy = composite.deep_copy();
        assert_eq!(copy, composite);
        let parts = copy.as_composite().unwrap();
        assert!(parts.values[1].as_entity().unwrap().ptr_eq(&target));
    }

    #[test]
    fn test_composite_identifier_flattening() {
        let id = ObjectValue::Composite(CompositeValue::new(
            "OrderLineId",
            vec![ObjectValue::basic(5), ObjectValue::basic("x")],
        ));
        assert_eq!(
            id.to_identifier().unwrap(),
            Some(Identifier::Composite(vec![Value::Integer(5), Value::from("x")]))
        );
        assert_eq!(ObjectValue::Null.to_identifier().unwrap(), None);
    }
}
