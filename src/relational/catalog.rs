use std::collections::HashMap;
use crate::core::{OrmError, Result, SqlType};
use super::{Column, ColumnId, ForeignKey, ForeignKeyId, Table, TableId, TableKind};

/// Catalog of the physical relational descriptors referenced by the runtime
/// model. Built once during model resolution, read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct RelationalModel {
    tables: Vec<Table>,
    columns: Vec<Column>,
    foreign_keys: Vec<ForeignKey>,
    tables_by_name: HashMap<String, TableId>,
}

impl RelationalModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, name: &str, kind: TableKind) -> Result<TableId> {
        if self.tables_by_name.contains_key(name) {
            return Err(OrmError::mapping(format!("Table '{}' is mapped twice", name)));
        }

        let id = TableId(self.tables.len());
        self.tables.push(Table::new(id, name.to_string(), kind));
        self.tables_by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register a table, or return the existing one when several mappings
    /// legitimately share it (single-table subclasses, collection tables).
    pub fn ensure_table(&mut self, name: &str, kind: TableKind) -> TableId {
        match self.tables_by_name.get(name) {
            Some(id) => *id,
            None => {
                let id = TableId(self.tables.len());
                self.tables.push(Table::new(id, name.to_string(), kind));
                self.tables_by_name.insert(name.to_string(), id);
                id
            }
        }
    }

    /// Register a column. A column may be mapped by several attributes
    /// (e.g. a foreign key column also mapped as a basic attribute) as long
    /// as the definitions agree.
    pub fn add_column(
        &mut self,
        table: TableId,
        name: &str,
        sql_type: SqlType,
        nullable: bool,
    ) -> Result<ColumnId> {
        if let Some(existing) = self.find_column(table, name) {
            let column = &self.columns[existing.0];
            if !column.is_same_definition(name, sql_type) {
                return Err(OrmError::mapping(format!(
                    "Column '{}.{}' mapped as both {} and {}",
                    self.table(table).name,
                    name,
                    column.sql_type,
                    sql_type
                )));
            }
            if !nullable {
                self.columns[existing.0].nullable = false;
            }
            return Ok(existing);
        }

        let id = ColumnId(self.columns.len());
        self.columns.push(Column {
            id,
            name: name.to_string(),
            table,
            sql_type,
            nullable,
        });
        self.tables[table.0].push_column(id);
        Ok(id)
    }

    pub fn add_foreign_key(
        &mut self,
        referring_table: TableId,
        target_table: TableId,
        column_pairs: Vec<(ColumnId, ColumnId)>,
    ) -> Result<ForeignKeyId> {
        if column_pairs.is_empty() {
            return Err(OrmError::mapping(format!(
                "Foreign key from '{}' to '{}' has no columns",
                self.table(referring_table).name,
                self.table(target_table).name
            )));
        }

        if let Some(existing) = self.foreign_keys.iter().find(|fk| {
            fk.referring_table == referring_table
                && fk.target_table == target_table
                && fk.column_pairs == column_pairs
        }) {
            return Ok(existing.id);
        }

        let id = ForeignKeyId(self.foreign_keys.len());
        let name = format!(
            "fk_{}_{}",
            self.table(referring_table).name,
            self.table(target_table).name
        );
        self.foreign_keys.push(ForeignKey {
            id,
            name,
            referring_table,
            target_table,
            column_pairs,
        });
        self.tables[referring_table.0].push_foreign_key(id);
        Ok(id)
    }

    pub(crate) fn set_primary_key(&mut self, table: TableId, columns: Vec<ColumnId>) {
        self.tables[table.0].set_primary_key(columns);
    }

    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.0]
    }

    pub fn column(&self, id: ColumnId) -> &Column {
        &self.columns[id.0]
    }

    pub fn foreign_key(&self, id: ForeignKeyId) -> &ForeignKey {
        &self.foreign_keys[id.0]
    }

    pub fn get_table(&self, name: &str) -> Result<&Table> {
        self.tables_by_name
            .get(name)
            .map(|id| &self.tables[id.0])
            .ok_or_else(|| OrmError::mapping(format!("Table '{}' not found", name)))
    }

    pub fn find_column(&self, table: TableId, name: &str) -> Option<ColumnId> {
        self.tables[table.0]
            .columns()
            .iter()
            .copied()
            .find(|id| self.columns[id.0].name == name)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables_by_name.contains_key(name)
    }

    pub fn tables(&self) -> &[Table] {
        &self.tables
    }

    pub fn qualified_name(&self, column: ColumnId) -> String {
        let column = self.column(column);
        format!("{}.{}", self.table(column.table).name, column.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_table_is_mapping_error() {
        let mut model = RelationalModel::new();
        model.add_table("point", TableKind::Primary).unwrap();
        let err = model.add_table("point", TableKind::Primary).unwrap_err();
        assert!(err.is_mapping_error());
        assert_eq!(
            model.ensure_table("point", TableKind::Primary),
            model.get_table("point").unwrap().id
        );
    }

    #[test]
    fn test_shared_column_must_agree() {
        let mut model = RelationalModel::new();
        let table = model.add_table("node", TableKind::Primary).unwrap();
        let a = model.add_column(table, "parent_id", SqlType::Integer, true).unwrap();
        let b = model.add_column(table, "parent_id", SqlType::Integer, false).unwrap();
        assert_eq!(a, b);
        assert!(!model.column(a).nullable);
        assert!(model.add_column(table, "parent_id", SqlType::Text, true).is_err());
    }

    #[test]
    fn test_foreign_keys_are_deduplicated() {
        let mut model = RelationalModel::new();
        let node = model.add_table("node", TableKind::Primary).unwrap();
        let id = model.add_column(node, "id", SqlType::Integer, false).unwrap();
        let parent = model.add_column(node, "parent_id", SqlType::Integer, true).unwrap();
        let first = model.add_foreign_key(node, node, vec![(parent, id)]).unwrap();
        let second = model.add_foreign_key(node, node, vec![(parent, id)]).unwrap();
        assert_eq!(first, second);
        assert_eq!(model.table(node).foreign_keys().len(), 1);
        assert_eq!(model.qualified_name(parent), "node.parent_id");
    }
}
