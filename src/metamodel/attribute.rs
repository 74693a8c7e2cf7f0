use serde::{Deserialize, Serialize};
use crate::core::SqlType;
use crate::relational::{ColumnId, ForeignKeyId};
use super::{BasicValueConverter, CollectionClassification, CollectionId, ManagedTypeId, NavigableRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTiming {
    #[default]
    Eager,
    Lazy,
}

impl FetchTiming {
    pub const fn eager() -> Self {
        Self::Eager
    }

    pub const fn lazy() -> Self {
        Self::Lazy
    }
}

/// What to do when a to-one foreign key points at a missing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundAction {
    #[default]
    Exception,
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToOneCardinality {
    ManyToOne,
    OneToOne,
}

/// How loaded values are copied into a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutabilityPlan {
    /// Values never change in place; snapshots may share them.
    Immutable,
    /// Values may be mutated in place; snapshots need a deep copy.
    Mutable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAttribute {
    pub column: ColumnId,
    pub sql_type: SqlType,
    pub converter: Option<BasicValueConverter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAttribute {
    pub embeddable: ManagedTypeId,
}

/// Side of the association holding the foreign key columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToOneKey {
    /// Borrowed from the other side once that side is resolved.
    Pending,
    /// Columns live on the owner's table and refer to the target identifier.
    Referring {
        columns: Vec<ColumnId>,
        foreign_key: ForeignKeyId,
    },
    /// Inverse side: columns live on the target's table and refer to the owner identifier.
    Target {
        columns: Vec<ColumnId>,
        foreign_key: ForeignKeyId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToOneAttribute {
    pub target: ManagedTypeId,
    pub cardinality: ToOneCardinality,
    pub fetch: FetchTiming,
    pub not_found: NotFoundAction,
    pub mapped_by: Option<String>,
    pub maps_id: Option<String>,
    pub key: ToOneKey,
}

impl ToOneAttribute {
    pub fn is_inverse(&self) -> bool {
        self.mapped_by.is_some()
    }

    /// Foreign key columns on the owner's table, if this side owns the key.
    pub fn referring_columns(&self) -> Option<&[ColumnId]> {
        match &self.key {
            ToOneKey::Referring { columns, .. } => Some(columns),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluralAttribute {
    pub collection: CollectionId,
    pub classification: CollectionClassification,
}

/// Closed set of attribute natures; every consumer matches exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    Basic(BasicAttribute),
    Embedded(EmbeddedAttribute),
    ToOne(ToOneAttribute),
    Plural(PluralAttribute),
}

/// A non-identifier persistent attribute, occupying one slot of its
/// container's state array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistentAttribute {
    pub name: String,
    pub role: NavigableRole,
    pub declaring_type: ManagedTypeId,
    /// Index into the container's flat state array.
    pub position: usize,
    pub nullable: bool,
    pub insertable: bool,
    pub updatable: bool,
    pub version: bool,
    pub natural_id: bool,
    pub mutability: MutabilityPlan,
    pub kind: AttributeKind,
}

impl PersistentAttribute {
    pub fn is_basic(&self) -> bool {
        matches!(self.kind, AttributeKind::Basic(_))
    }

    pub fn is_association(&self) -> bool {
        matches!(self.kind, AttributeKind::ToOne(_) | AttributeKind::Plural(_))
    }

    pub fn as_to_one(&self) -> Option<&ToOneAttribute> {
        match &self.kind {
            AttributeKind::ToOne(to_one) => Some(to_one),
            _ => None,
        }
    }

    pub fn as_plural(&self) -> Option<&PluralAttribute> {
        match &self.kind {
            AttributeKind::Plural(plural) => Some(plural),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            AttributeKind::Basic(_) => "basic",
            AttributeKind::Embedded(_) => "embedded",
            AttributeKind::ToOne(to_one) => match to_one.cardinality {
                ToOneCardinality::ManyToOne => "many-to-one",
                ToOneCardinality::OneToOne => "one-to-one",
            },
            AttributeKind::Plural(_) => "plural",
        }
    }
}
