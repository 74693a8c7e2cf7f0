//! Tabular results and the forward-only cursor row processing consumes.

mod query_result;

use crate::core::{Result, Value};

pub use query_result::{QueryResult, RowsCursor};

/// One result-set row, values in selection-position order.
pub type Row = Vec<Value>;

/// Forward-only row source over a database result set. A failing
/// read aborts the whole traversal.
pub trait ResultSetCursor {
    fn column_count(&self) -> usize;

    /// Advance to the next row. `Ok(None)` marks the end of the results.
    fn next_row(&mut self) -> Result<Option<Row>>;
}
