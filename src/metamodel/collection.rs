use serde::{Deserialize, Serialize};
use crate::core::{OrmError, Result, SqlType};
use crate::relational::{ColumnId, ForeignKeyId, TableId};
use super::{BasicValueConverter, FetchTiming, ManagedTypeId, NavigableRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(pub(crate) usize);

impl CollectionId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionClassification {
    Bag,
    IdBag,
    List,
    Set,
    Map,
    Array,
}

impl CollectionClassification {
    pub fn is_indexed(self) -> bool {
        matches!(self, Self::List | Self::Map | Self::Array)
    }

    /// Arrays are materialized as plain values, never as lazy wrappers.
    pub fn is_array(self) -> bool {
        matches!(self, Self::Array)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementNature {
    OneToMany,
    ManyToMany,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionElement {
    /// Placeholder until the element side can be resolved against the full model.
    Unresolved,
    Basic {
        column: ColumnId,
        sql_type: SqlType,
        converter: Option<BasicValueConverter>,
    },
    Embedded {
        embeddable: ManagedTypeId,
    },
    Entity {
        target: ManagedTypeId,
        nature: ElementNature,
        /// Foreign key columns to the target (many-to-many only).
        columns: Vec<ColumnId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionIndex {
    Basic {
        column: ColumnId,
        sql_type: SqlType,
        base: i64,
    },
    Embedded {
        embeddable: ManagedTypeId,
    },
}

/// Columns carrying the owner key on the table holding the collection rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionKeyDescriptor {
    pub table: TableId,
    pub columns: Vec<ColumnId>,
    pub foreign_key: ForeignKeyId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionIdentifierDescriptor {
    pub column: ColumnId,
    pub sql_type: SqlType,
}

/// Runtime descriptor of a plural attribute.
///
/// Built in two steps: the boot shape is captured when the owning attribute is
/// resolved, the element, index and key sides once every entity descriptor
/// exists.
#[derive(Debug, Clone)]
pub struct PersistentCollectionDescriptor {
    pub id: CollectionId,
    pub role: NavigableRole,
    pub owner: ManagedTypeId,
    pub attribute_name: String,
    pub classification: CollectionClassification,
    pub collection_table: Option<TableId>,
    pub key: Option<CollectionKeyDescriptor>,
    pub element: CollectionElement,
    pub index: Option<CollectionIndex>,
    pub identifier: Option<CollectionIdentifierDescriptor>,
    pub batch_size: usize,
    pub inverse: bool,
    pub orphan_delete: bool,
    pub extra_lazy: bool,
    pub fetch: FetchTiming,
    pub mapped_by: Option<String>,
}

impl PersistentCollectionDescriptor {
    pub fn is_resolved(&self) -> bool {
        self.key.is_some() && !matches!(self.element, CollectionElement::Unresolved)
    }

    pub fn key(&self) -> Result<&CollectionKeyDescriptor> {
        self.key.as_ref().ok_or_else(|| {
            OrmError::UnresolvedReference(format!("Collection key of '{}' is not resolved", self.role))
        })
    }

    pub fn element_entity(&self) -> Option<ManagedTypeId> {
        match &self.element {
            CollectionElement::Entity { target, .. } => Some(*target),
            _ => None,
        }
    }

    pub fn is_batch_loadable(&self) -> bool {
        self.batch_size > 1
    }
}
