pub mod error;
pub mod identifier;
pub mod value;

pub use error::{OrmError, Result};
pub use identifier::Identifier;
pub use value::{SqlType, Value};
