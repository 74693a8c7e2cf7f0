//! Per-hierarchy descriptors: identifier, version, discriminator, natural id,
//! row id and tenant discrimination.

pub mod assembly;
pub mod descriptors;
pub mod identifier;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use crate::cache::EntityDataAccess;
use crate::metamodel::ManagedTypeId;

pub use descriptors::{
    DiscriminatorDescriptor, InheritanceStrategy, NaturalIdAttribute, NaturalIdDescriptor,
    NaturalIdPersistenceType, OptimisticLockStyle, RowIdDescriptor, TenantDiscrimination,
    VersionDescriptor,
};
pub use identifier::{
    AggregatedIdentifierDescriptor, IdGeneratorKind, IdentifierDescriptor,
    NonAggregatedIdentifierDescriptor, SimpleIdentifierDescriptor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HierarchyId(pub(crate) usize);

impl HierarchyId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Descriptors shared by every entity of one inheritance hierarchy.
#[derive(Debug, Clone)]
pub struct EntityHierarchy {
    pub id: HierarchyId,
    pub root_entity: ManagedTypeId,
    pub strategy: InheritanceStrategy,
    pub identifier: IdentifierDescriptor,
    pub version: Option<VersionDescriptor>,
    pub discriminator: Option<DiscriminatorDescriptor>,
    pub natural_id: Option<NaturalIdDescriptor>,
    pub row_id: Option<RowIdDescriptor>,
    pub tenant: Option<TenantDiscrimination>,
    pub mutable: bool,
    pub optimistic_lock: OptimisticLockStyle,
    pub cache: Option<Arc<dyn EntityDataAccess>>,
    /// Root first, then subclasses in build order.
    pub entities: Vec<ManagedTypeId>,
}

impl EntityHierarchy {
    pub(crate) fn new(
        id: HierarchyId,
        root_entity: ManagedTypeId,
        strategy: InheritanceStrategy,
        identifier: IdentifierDescriptor,
    ) -> Self {
        Self {
            id,
            root_entity,
            strategy,
            identifier,
            version: None,
            discriminator: None,
            natural_id: None,
            row_id: None,
            tenant: None,
            mutable: true,
            optimistic_lock: OptimisticLockStyle::default(),
            cache: None,
            entities: vec![root_entity],
        }
    }

    pub fn is_polymorphic(&self) -> bool {
        self.entities.len() > 1 && self.strategy != InheritanceStrategy::TablePerClass
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    pub fn is_versioned(&self) -> bool {
        self.version.is_some()
    }
}
