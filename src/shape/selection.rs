use std::collections::HashMap;
use crate::core::SqlType;
use crate::relational::{ColumnId, RelationalModel};

/// A column read by the query, bound to a fixed position of each row's
/// values array. Positions are shared between the query compiler and row
/// processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSelection {
    pub position: usize,
    pub alias: String,
    pub column: ColumnId,
    pub sql_type: SqlType,
}

/// Obtains the selection for a table-alias-qualified column, creating it on
/// first use.
pub trait SqlExpressionResolver {
    fn resolve_sql_selection(&mut self, alias: &str, column: ColumnId, relational: &RelationalModel) -> SqlSelection;
}

/// Resolver that assigns positions in first-use order and reuses the
/// selection of a column already selected under the same alias.
#[derive(Debug, Default)]
pub struct SqlSelectionCollector {
    selections: Vec<SqlSelection>,
    labels: Vec<String>,
    index: HashMap<(String, ColumnId), usize>,
}

impl SqlSelectionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selections(&self) -> &[SqlSelection] {
        &self.selections
    }

    /// `alias.column` labels in position order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.selections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }
}

impl SqlExpressionResolver for SqlSelectionCollector {
    fn resolve_sql_selection(&mut self, alias: &str, column: ColumnId, relational: &RelationalModel) -> SqlSelection {
        if let Some(position) = self.index.get(&(alias.to_string(), column)) {
            return self.selections[*position].clone();
        }
        let definition = relational.column(column);
        let selection = SqlSelection {
            position: self.selections.len(),
            alias: alias.to_string(),
            column,
            sql_type: definition.sql_type,
        };
        self.labels.push(format!("{}.{}", alias, definition.name));
        self.index.insert((alias.to_string(), column), selection.position);
        self.selections.push(selection.clone());
        selection
    }
}
