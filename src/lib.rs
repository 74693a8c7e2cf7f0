// ============================================================================
// RustMemORM Library
// ============================================================================

pub mod core;
pub mod relational;
pub mod boot;
pub mod metamodel;
pub mod hierarchy;
pub mod instance;
pub mod shape;
pub mod context;
pub mod cache;
pub mod event;
pub mod engine;
pub mod processing;
pub mod result;
pub mod session;
pub mod config;

// Re-export main types for convenience
pub use core::{Identifier, OrmError, Result, SqlType, Value};
pub use boot::{AttributeMapping, BootModel, ElementMapping, IndexMapping, ManagedTypeMapping, PluralMapping};
pub use config::{ModelConfig, SessionConfig};
pub use metamodel::{NavigableRole, RuntimeModel};
pub use instance::{EntityInstance, EntityProxy, ObjectValue, PersistentCollection};
pub use context::{EntityKey, PersistenceContext, Status};
pub use event::{EventType, LoadEvent, LoadEventListener};
pub use result::{QueryResult, ResultSetCursor};
pub use session::LoadSession;
