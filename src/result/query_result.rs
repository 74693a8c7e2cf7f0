use crate::core::{OrmError, Result, Value};
use super::{ResultSetCursor, Row};

/// Materialized tabular result: labelled columns and rows of raw values.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    /// Build a result from column labels and rows given in the same order.
    pub fn from_labeled(columns: &[&str], rows: Vec<Row>) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|row| row.len() != columns.len()) {
            return Err(OrmError::ResultSetError(format!(
                "Row {} has {} values for {} columns",
                bad,
                rows[bad].len(),
                columns.len()
            )));
        }
        Ok(Self::new(columns.iter().map(|c| c.to_string()).collect(), rows))
    }

    /// Reorder columns to match `labels`. Labels absent from this result
    /// read as NULL, like the null-extended side of an outer join.
    pub fn aligned_to(&self, labels: &[String]) -> Self {
        let mapping: Vec<Option<usize>> = labels
            .iter()
            .map(|label| self.columns.iter().position(|c| c == label))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                mapping
                    .iter()
                    .map(|idx| idx.and_then(|i| row.get(i).cloned()).unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self::new(labels.to_vec(), rows)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cursor(&self) -> RowsCursor<'_> {
        RowsCursor {
            result: self,
            next: 0,
        }
    }
}

/// Forward-only cursor over a [`QueryResult`].
#[derive(Debug)]
pub struct RowsCursor<'a> {
    result: &'a QueryResult,
    next: usize,
}

impl ResultSetCursor for RowsCursor<'_> {
    fn column_count(&self) -> usize {
        self.result.columns.len()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        let row = self.result.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        Ok(row)
    }
}
