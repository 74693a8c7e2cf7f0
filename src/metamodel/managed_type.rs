use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use crate::core::{OrmError, Result, Value};
use crate::hierarchy::HierarchyId;
use crate::relational::{ColumnId, TableId};
use super::{CollectionId, NavigableRole, PersistentAttribute, RepresentationStrategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManagedTypeId(pub(crate) usize);

impl ManagedTypeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A table in an entity's table closure, with its key columns aligned to the
/// identifier columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableBinding {
    pub table: TableId,
    pub key_columns: Vec<ColumnId>,
    /// Entity whose descriptor introduced the table.
    pub contributor: ManagedTypeId,
    /// Optional tables (secondary, subclass) are outer-joined.
    pub optional: bool,
}

#[derive(Debug, Clone)]
pub struct EntityDetails {
    pub entity_name: String,
    pub jpa_name: String,
    pub hierarchy: HierarchyId,
    pub primary_table: TableId,
    /// Identifier columns on the primary table.
    pub identifier_columns: Vec<ColumnId>,
    /// Every table the entity state spans: primary (or root) table first,
    /// then superclass/subclass tables and secondary tables.
    pub tables: Vec<TableBinding>,
    pub discriminator_value: Option<DiscriminatorValue>,
    pub can_read_from_cache: bool,
    pub can_write_to_cache: bool,
    pub enhanced_for_lazy_loading: bool,
    pub batch_size: usize,
}

impl EntityDetails {
    pub fn is_batch_loadable(&self) -> bool {
        self.batch_size > 1
    }
}

/// Literal used to pick the concrete subclass for a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiscriminatorValue {
    Literal(Value),
    Null,
    NotNull,
}

/// Owner of an embeddable usage. Embeddables never have independent identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddedContainer {
    Attribute { owner: ManagedTypeId, attribute: String },
    Identifier { entity: ManagedTypeId },
    CollectionElement(CollectionId),
    CollectionIndex(CollectionId),
}

#[derive(Debug, Clone)]
pub struct EmbeddableDetails {
    pub embeddable_name: String,
    pub container: EmbeddedContainer,
}

#[derive(Debug, Clone)]
pub enum ManagedTypeKind {
    Entity(Box<EntityDetails>),
    /// Mapped superclasses have no tables; their attributes are bound into
    /// each inheriting entity's own state array.
    MappedSuperclass { declared_attributes: Vec<String> },
    Embeddable(EmbeddableDetails),
}

#[derive(Debug, Clone)]
pub struct ManagedTypeDescriptor {
    pub id: ManagedTypeId,
    pub name: String,
    pub role: NavigableRole,
    pub kind: ManagedTypeKind,
    pub is_root: bool,
    pub super_type: Option<ManagedTypeId>,
    pub sub_types: Vec<ManagedTypeId>,
    pub representation: Arc<dyn RepresentationStrategy>,
    attributes: Vec<PersistentAttribute>,
    attribute_index: HashMap<String, usize>,
}

impl ManagedTypeDescriptor {
    pub(crate) fn new(
        id: ManagedTypeId,
        name: &str,
        role: NavigableRole,
        kind: ManagedTypeKind,
        representation: Arc<dyn RepresentationStrategy>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            role,
            kind,
            is_root: false,
            super_type: None,
            sub_types: Vec::new(),
            representation,
            attributes: Vec::new(),
            attribute_index: HashMap::new(),
        }
    }

    /// Install the full state array. Positions must be dense and in order.
    pub(crate) fn set_attributes(&mut self, attributes: Vec<PersistentAttribute>) -> Result<()> {
        let mut index = HashMap::with_capacity(attributes.len());
        for (expected, attribute) in attributes.iter().enumerate() {
            if attribute.position != expected {
                return Err(OrmError::mapping(format!(
                    "Attribute '{}' of '{}' has state-array position {}, expected {}",
                    attribute.name, self.name, attribute.position, expected
                )));
            }
            if index.insert(attribute.name.clone(), expected).is_some() {
                return Err(OrmError::mapping(format!(
                    "Attribute '{}' is mapped twice on '{}'",
                    attribute.name, self.name
                )));
            }
        }
        self.attributes = attributes;
        self.attribute_index = index;
        Ok(())
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut [PersistentAttribute] {
        &mut self.attributes
    }

    /// Full state array, inherited attributes included, ordered by position.
    pub fn attributes(&self) -> &[PersistentAttribute] {
        &self.attributes
    }

    /// Attributes declared directly by this type.
    pub fn declared_attributes(&self) -> impl Iterator<Item = &PersistentAttribute> {
        self.attributes.iter().filter(move |a| a.declaring_type == self.id)
    }

    pub fn find_attribute(&self, name: &str) -> Option<&PersistentAttribute> {
        self.attribute_index.get(name).map(|idx| &self.attributes[*idx])
    }

    pub fn attribute(&self, name: &str) -> Result<&PersistentAttribute> {
        self.find_attribute(name).ok_or_else(|| {
            OrmError::mapping(format!("Attribute '{}' not found on '{}'", name, self.name))
        })
    }

    pub fn state_array_size(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_entity(&self) -> bool {
        matches!(self.kind, ManagedTypeKind::Entity(_))
    }

    pub fn is_embeddable(&self) -> bool {
        matches!(self.kind, ManagedTypeKind::Embeddable(_))
    }

    pub fn entity_details(&self) -> Option<&EntityDetails> {
        match &self.kind {
            ManagedTypeKind::Entity(details) => Some(details),
            _ => None,
        }
    }

    pub(crate) fn entity_details_mut(&mut self) -> Option<&mut EntityDetails> {
        match &mut self.kind {
            ManagedTypeKind::Entity(details) => Some(details),
            _ => None,
        }
    }

    pub fn expect_entity(&self) -> Result<&EntityDetails> {
        self.entity_details().ok_or_else(|| {
            OrmError::mapping(format!("Managed type '{}' is not an entity", self.name))
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            ManagedTypeKind::Entity(_) => "entity",
            ManagedTypeKind::MappedSuperclass { .. } => "mapped-superclass",
            ManagedTypeKind::Embeddable(_) => "embeddable",
        }
    }
}
