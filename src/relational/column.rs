use serde::{Deserialize, Serialize};
use std::fmt;
use crate::core::SqlType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ForeignKeyId(pub(crate) usize);

impl TableId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl ColumnId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Physical column. Immutable once registered in the relational model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub name: String,
    pub table: TableId,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl Column {
    pub fn is_same_definition(&self, name: &str, sql_type: SqlType) -> bool {
        self.name == name && self.sql_type == sql_type
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.sql_type)?;
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}
