pub mod catalog;
pub mod column;
pub mod table;

pub use catalog::RelationalModel;
pub use column::{Column, ColumnId, ForeignKeyId, TableId};
pub use table::{ForeignKey, Table, TableKind};
