//! Boot-time mapping objects.
//!
//! These are produced by the annotation scanners / mapping document binders
//! and are consumed read-only by model resolution.

pub mod mapping;

pub use mapping::{
    AttributeKindMapping, AttributeMapping, BasicMapping, BootModel, CacheMapping,
    DiscriminatorMapping, ElementMapping, EmbeddedMapping, IndexMapping, ManagedTypeKindMapping,
    ManagedTypeMapping, PluralMapping, SecondaryTableMapping, ToOneMapping,
};
