//! Runtime domain objects produced by row processing.

pub mod collection;
pub mod object;
pub mod proxy;

pub use collection::PersistentCollection;
pub use object::{CompositeValue, EntityInstance, ObjectValue};
pub(crate) use object::SavedInstance;
pub use proxy::EntityProxy;
