use std::fmt;
use std::rc::Rc;
use crate::core::Value;
use crate::instance::ObjectValue;
use crate::metamodel::ManagedTypeId;
use super::EntityKey;

/// Lifecycle status of a managed entity.
///
/// ```text
/// Loading ──two-phase load──> Managed
///    │
///    └──read-only load──> ReadOnly
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// State is being injected; the entity must not be dirty-checked yet
    Loading,

    /// Fully loaded and eligible for dirty-checking
    Managed,

    /// Fully loaded; no snapshot copy is kept
    ReadOnly,
}

impl Status {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Status::Managed | Status::ReadOnly)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Loading => write!(f, "LOADING"),
            Status::Managed => write!(f, "MANAGED"),
            Status::ReadOnly => write!(f, "READ_ONLY"),
        }
    }
}

/// Persistence-context bookkeeping for one managed entity.
#[derive(Debug, Clone)]
pub struct EntityEntry {
    pub key: EntityKey,
    /// Concrete entity type of the instance
    pub entity: ManagedTypeId,
    pub status: Status,

    /// Snapshot of the loaded state array, indexed by state-array position.
    /// Read-only entities share the live array instead of copying it.
    pub loaded_state: Option<Rc<Vec<ObjectValue>>>,
    pub version: Option<Value>,
    pub exists_in_database: bool,
}

impl EntityEntry {
    pub fn loading(key: EntityKey, entity: ManagedTypeId) -> Self {
        Self {
            key,
            entity,
            status: Status::Loading,
            loaded_state: None,
            version: None,
            exists_in_database: true,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.status == Status::ReadOnly
    }

    /// Finish the load: record the snapshot and leave the LOADING status.
    pub fn post_load(&mut self, snapshot: Rc<Vec<ObjectValue>>, version: Option<Value>, read_only: bool) {
        self.loaded_state = Some(snapshot);
        self.version = version;
        self.status = if read_only { Status::ReadOnly } else { Status::Managed };
    }
}
