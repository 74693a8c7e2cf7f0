use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::core::{SqlType, Value};
use crate::metamodel::{DiscriminatorValue, ManagedTypeId};
use crate::relational::ColumnId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceStrategy {
    #[default]
    SingleTable,
    Joined,
    TablePerClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimisticLockStyle {
    None,
    #[default]
    Version,
    Dirty,
    All,
}

#[derive(Debug, Clone)]
pub struct VersionDescriptor {
    pub attribute_name: String,
    /// State-array position of the version attribute.
    pub position: usize,
    pub column: ColumnId,
    pub sql_type: SqlType,
}

#[derive(Debug, Clone)]
pub struct DiscriminatorDescriptor {
    pub column: ColumnId,
    pub sql_type: SqlType,
    values: HashMap<DiscriminatorValue, ManagedTypeId>,
}

impl DiscriminatorDescriptor {
    pub fn new(column: ColumnId, sql_type: SqlType) -> Self {
        Self {
            column,
            sql_type,
            values: HashMap::new(),
        }
    }

    /// Register a subclass value; returns the previous owner of the value, if any.
    pub(crate) fn register(
        &mut self,
        value: DiscriminatorValue,
        entity: ManagedTypeId,
    ) -> Option<ManagedTypeId> {
        self.values.insert(value, entity)
    }

    /// Concrete entity for a raw discriminator column value.
    pub fn resolve(&self, raw: &Value) -> Option<ManagedTypeId> {
        if raw.is_null() {
            return self.values.get(&DiscriminatorValue::Null).copied();
        }
        self.values
            .get(&DiscriminatorValue::Literal(raw.clone()))
            .or_else(|| self.values.get(&DiscriminatorValue::NotNull))
            .copied()
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaturalIdPersistenceType {
    Basic,
    Embeddable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NaturalIdAttribute {
    pub name: String,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct NaturalIdDescriptor {
    /// Natural-id attributes in state-array order.
    pub attributes: Vec<NaturalIdAttribute>,
    pub mutable: bool,
    pub persistence_type: NaturalIdPersistenceType,
}

impl NaturalIdDescriptor {
    pub fn positions(&self) -> Vec<usize> {
        self.attributes.iter().map(|a| a.position).collect()
    }
}

#[derive(Debug, Clone)]
pub struct RowIdDescriptor {
    pub column_name: String,
    pub column: ColumnId,
}

/// Column holding the tenant identifier of each row.
#[derive(Debug, Clone)]
pub struct TenantDiscrimination {
    pub column: ColumnId,
    pub sql_type: SqlType,
}
