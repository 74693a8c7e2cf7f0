//! Runtime navigable model: managed types, attributes and collections bound
//! to the relational model.

pub mod attribute;
pub mod collection;
pub mod converter;
pub mod managed_type;
pub mod model;
pub mod representation;
pub mod resolve;
pub mod role;

pub use attribute::{
    AttributeKind, BasicAttribute, EmbeddedAttribute, FetchTiming, MutabilityPlan, NotFoundAction,
    PersistentAttribute, PluralAttribute, ToOneAttribute, ToOneCardinality, ToOneKey,
};
pub use collection::{
    CollectionClassification, CollectionElement, CollectionId, CollectionIdentifierDescriptor,
    CollectionIndex, CollectionKeyDescriptor, ElementNature, PersistentCollectionDescriptor,
};
pub use converter::BasicValueConverter;
pub use managed_type::{
    DiscriminatorValue, EmbeddableDetails, EmbeddedContainer, EntityDetails, ManagedTypeDescriptor,
    ManagedTypeId, ManagedTypeKind, TableBinding,
};
pub use model::{NavigableRef, RuntimeModel};
pub use representation::{DynamicMapRepresentation, RepresentationStrategy};
pub use role::NavigableRole;
