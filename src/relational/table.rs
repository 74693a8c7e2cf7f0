use serde::{Deserialize, Serialize};
use super::{ColumnId, ForeignKeyId, TableId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableKind {
    /// Root table of an entity (or of a table-per-class subclass).
    Primary,
    /// Secondary table joined to an entity's primary table by its key.
    Secondary,
    /// Subclass table of a joined inheritance hierarchy.
    JoinedSubclass,
    /// Separate table holding collection rows.
    Collection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub name: String,
    pub kind: TableKind,
    columns: Vec<ColumnId>,
    primary_key: Vec<ColumnId>,
    foreign_keys: Vec<ForeignKeyId>,
}

impl Table {
    pub(crate) fn new(id: TableId, name: String, kind: TableKind) -> Self {
        Self {
            id,
            name,
            kind,
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.columns
    }

    pub fn primary_key(&self) -> &[ColumnId] {
        &self.primary_key
    }

    pub fn foreign_keys(&self) -> &[ForeignKeyId] {
        &self.foreign_keys
    }

    pub(crate) fn push_column(&mut self, column: ColumnId) {
        self.columns.push(column);
    }

    pub(crate) fn set_primary_key(&mut self, columns: Vec<ColumnId>) {
        self.primary_key = columns;
    }

    pub(crate) fn push_foreign_key(&mut self, foreign_key: ForeignKeyId) {
        self.foreign_keys.push(foreign_key);
    }
}

/// Foreign key from `referring_table` to `target_table`, column pairs in key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub id: ForeignKeyId,
    pub name: String,
    pub referring_table: TableId,
    pub target_table: TableId,
    pub column_pairs: Vec<(ColumnId, ColumnId)>,
}

impl ForeignKey {
    pub fn referring_columns(&self) -> Vec<ColumnId> {
        self.column_pairs.iter().map(|(referring, _)| *referring).collect()
    }

    pub fn target_columns(&self) -> Vec<ColumnId> {
        self.column_pairs.iter().map(|(_, target)| *target).collect()
    }
}
