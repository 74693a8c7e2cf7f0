use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use crate::core::{Identifier, Value};
use crate::metamodel::{CollectionClassification, CollectionId, NavigableRole};
use super::ObjectValue;

#[derive(Debug, Clone)]
pub(crate) enum CollectionContents {
    /// Bags, sets, lists and arrays; lists and arrays are index-addressed.
    Elements(Vec<ObjectValue>),
    IdBag(Vec<(Value, ObjectValue)>),
    Map(Vec<(ObjectValue, ObjectValue)>),
}

struct CollectionData {
    role: NavigableRole,
    collection: CollectionId,
    owner_key: Option<Identifier>,
    classification: CollectionClassification,
    initialized: bool,
    contents: CollectionContents,
}

/// Wrapper installed into an owner's collection attribute. It may be handed
/// out uninitialized and populated later, either by subsequent rows of the
/// same result set or by a separate load.
#[derive(Clone)]
pub struct PersistentCollection(Rc<RefCell<CollectionData>>);

impl PersistentCollection {
    pub fn new(
        role: NavigableRole,
        collection: CollectionId,
        classification: CollectionClassification,
        owner_key: Option<Identifier>,
    ) -> Self {
        let contents = match classification {
            CollectionClassification::IdBag => CollectionContents::IdBag(Vec::new()),
            CollectionClassification::Map => CollectionContents::Map(Vec::new()),
            _ => CollectionContents::Elements(Vec::new()),
        };
        Self(Rc::new(RefCell::new(CollectionData {
            role,
            collection,
            owner_key,
            classification,
            initialized: false,
            contents,
        })))
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn role(&self) -> NavigableRole {
        self.0.borrow().role.clone()
    }

    pub fn collection_id(&self) -> CollectionId {
        self.0.borrow().collection
    }

    pub fn owner_key(&self) -> Option<Identifier> {
        self.0.borrow().owner_key.clone()
    }

    pub fn classification(&self) -> CollectionClassification {
        self.0.borrow().classification
    }

    pub fn was_initialized(&self) -> bool {
        self.0.borrow().initialized
    }

    pub(crate) fn after_initialize(&self) {
        self.0.borrow_mut().initialized = true;
    }

    pub fn len(&self) -> usize {
        match &self.0.borrow().contents {
            CollectionContents::Elements(values) => values.len(),
            CollectionContents::IdBag(entries) => entries.len(),
            CollectionContents::Map(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element values in collection order (map values for maps).
    pub fn elements(&self) -> Vec<ObjectValue> {
        match &self.0.borrow().contents {
            CollectionContents::Elements(values) => values.clone(),
            CollectionContents::IdBag(entries) => entries.iter().map(|(_, v)| v.clone()).collect(),
            CollectionContents::Map(entries) => entries.iter().map(|(_, v)| v.clone()).collect(),
        }
    }

    pub fn map_entries(&self) -> Vec<(ObjectValue, ObjectValue)> {
        match &self.0.borrow().contents {
            CollectionContents::Map(entries) => entries.clone(),
            _ => Vec::new(),
        }
    }

    pub fn identifiers(&self) -> Vec<Value> {
        match &self.0.borrow().contents {
            CollectionContents::IdBag(entries) => entries.iter().map(|(id, _)| id.clone()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn contains_identifier(&self, identifier: &Value) -> bool {
        match &self.0.borrow().contents {
            CollectionContents::IdBag(entries) => entries.iter().any(|(id, _)| id == identifier),
            _ => false,
        }
    }

    pub fn get(&self, index: usize) -> Option<ObjectValue> {
        match &self.0.borrow().contents {
            CollectionContents::Elements(values) => values.get(index).cloned(),
            _ => None,
        }
    }

    pub fn get_by_key(&self, key: &ObjectValue) -> Option<ObjectValue> {
        match &self.0.borrow().contents {
            CollectionContents::Map(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
            }
            _ => None,
        }
    }

    pub fn contains(&self, element: &ObjectValue) -> bool {
        match &self.0.borrow().contents {
            CollectionContents::Elements(values) => values.contains(element),
            CollectionContents::IdBag(entries) => entries.iter().any(|(_, v)| v == element),
            CollectionContents::Map(entries) => entries.iter().any(|(_, v)| v == element),
        }
    }

    pub(crate) fn append(&self, element: ObjectValue) {
        if let CollectionContents::Elements(values) = &mut self.0.borrow_mut().contents {
            values.push(element);
        }
    }

    /// Place `element` at `index`, padding any gap with nulls. Callers bound
    /// `index` before calling.
    pub(crate) fn put_at(&self, index: usize, element: ObjectValue) {
        if let CollectionContents::Elements(values) = &mut self.0.borrow_mut().contents {
            if values.len() <= index {
                values.resize(index + 1, ObjectValue::Null);
            }
            values[index] = element;
        }
    }

    pub(crate) fn put_entry(&self, key: ObjectValue, value: ObjectValue) {
        if let CollectionContents::Map(entries) = &mut self.0.borrow_mut().contents {
            entries.push((key, value));
        }
    }

    pub(crate) fn put_identified(&self, identifier: Value, element: ObjectValue) {
        if let CollectionContents::IdBag(entries) = &mut self.0.borrow_mut().contents {
            entries.push((identifier, element));
        }
    }

    pub(crate) fn clear_contents(&self) {
        let mut data = self.0.borrow_mut();
        let emptied = match &data.contents {
            CollectionContents::Elements(_) => CollectionContents::Elements(Vec::new()),
            CollectionContents::IdBag(_) => CollectionContents::IdBag(Vec::new()),
            CollectionContents::Map(_) => CollectionContents::Map(Vec::new()),
        };
        data.contents = emptied;
    }

    /// Replace this wrapper's contents with those of `source` and mark it
    /// initialized. Used when a collection populated off to the side is
    /// handed to a wrapper other objects already reference.
    pub(crate) fn take_contents_from(&self, source: &PersistentCollection) {
        if self.ptr_eq(source) {
            self.after_initialize();
            return;
        }
        let contents = source.0.borrow().contents.clone();
        let mut data = self.0.borrow_mut();
        data.contents = contents;
        data.initialized = true;
    }
}

impl Hash for PersistentCollection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state);
    }
}

impl fmt::Debug for PersistentCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.0.borrow();
        let owner = data
            .owner_key
            .as_ref()
            .map_or_else(|| "?".to_string(), ToString::to_string);
        if data.initialized {
            write!(f, "{}#{}[{} entries]", data.role, owner, self.len())
        } else {
            write!(f, "{}#{}<uninitialized>", data.role, owner)
        }
    }
}
