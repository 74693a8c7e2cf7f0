use serde::{Deserialize, Serialize};
use crate::core::{Identifier, OrmError, Result, SqlType, Value};
use crate::instance::{EntityInstance, ObjectValue};
use crate::metamodel::{ManagedTypeDescriptor, ManagedTypeId, NavigableRole};
use crate::relational::ColumnId;

/// Identifier generation strategy. Recorded for the persist side; loading
/// never generates identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdGeneratorKind {
    #[default]
    Assigned,
    Identity,
    Sequence { name: String },
    Uuid,
    Increment,
}

#[derive(Debug, Clone)]
pub struct SimpleIdentifierDescriptor {
    pub attribute_name: String,
    pub role: NavigableRole,
    pub column: ColumnId,
    pub sql_type: SqlType,
    pub generator: IdGeneratorKind,
}

/// `@EmbeddedId`: the identifier is one embeddable-valued attribute.
#[derive(Debug, Clone)]
pub struct AggregatedIdentifierDescriptor {
    pub attribute_name: String,
    pub role: NavigableRole,
    pub embeddable: ManagedTypeId,
    pub columns: Vec<ColumnId>,
    pub sql_types: Vec<SqlType>,
    pub generator: IdGeneratorKind,
}

/// Several `@Id` attributes, exposed through a synthesized id-class embeddable.
#[derive(Debug, Clone)]
pub struct NonAggregatedIdentifierDescriptor {
    pub role: NavigableRole,
    pub id_class: ManagedTypeId,
    /// Id attribute names in id-class (local state array) order.
    pub attribute_names: Vec<String>,
    pub columns: Vec<ColumnId>,
    pub sql_types: Vec<SqlType>,
}

#[derive(Debug, Clone)]
pub enum IdentifierDescriptor {
    Simple(SimpleIdentifierDescriptor),
    AggregatedComposite(AggregatedIdentifierDescriptor),
    NonAggregatedComposite(NonAggregatedIdentifierDescriptor),
}

impl IdentifierDescriptor {
    /// Identifier columns on the root table, in part order.
    pub fn columns(&self) -> &[ColumnId] {
        match self {
            Self::Simple(simple) => std::slice::from_ref(&simple.column),
            Self::AggregatedComposite(aggregated) => &aggregated.columns,
            Self::NonAggregatedComposite(non_aggregated) => &non_aggregated.columns,
        }
    }

    pub fn sql_types(&self) -> Vec<SqlType> {
        match self {
            Self::Simple(simple) => vec![simple.sql_type],
            Self::AggregatedComposite(aggregated) => aggregated.sql_types.clone(),
            Self::NonAggregatedComposite(non_aggregated) => non_aggregated.sql_types.clone(),
        }
    }

    pub fn is_composite(&self) -> bool {
        !matches!(self, Self::Simple(_))
    }

    pub fn role(&self) -> &NavigableRole {
        match self {
            Self::Simple(simple) => &simple.role,
            Self::AggregatedComposite(aggregated) => &aggregated.role,
            Self::NonAggregatedComposite(non_aggregated) => &non_aggregated.role,
        }
    }

    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            Self::Simple(simple) => Some(&simple.attribute_name),
            Self::AggregatedComposite(aggregated) => Some(&aggregated.attribute_name),
            Self::NonAggregatedComposite(_) => None,
        }
    }

    /// Embeddable describing the identifier parts of a composite identifier.
    pub fn embeddable(&self) -> Option<ManagedTypeId> {
        match self {
            Self::Simple(_) => None,
            Self::AggregatedComposite(aggregated) => Some(aggregated.embeddable),
            Self::NonAggregatedComposite(non_aggregated) => Some(non_aggregated.id_class),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Simple(_) => "simple",
            Self::AggregatedComposite(_) => "aggregated-composite",
            Self::NonAggregatedComposite(_) => "non-aggregated-composite",
        }
    }

    /// Assemble hydrated column values into an identifier. All-NULL parts
    /// mean there is no row.
    pub fn assemble(&self, parts: Vec<Value>) -> Option<Identifier> {
        Identifier::from_parts(parts, self.is_composite())
    }

    /// Domain value of the identifier, as installed on an instance.
    pub fn to_object_value(
        &self,
        identifier: &Identifier,
        composite_type: Option<&ManagedTypeDescriptor>,
    ) -> Result<ObjectValue> {
        match (self, identifier) {
            (Self::Simple(_), Identifier::Simple(value)) => Ok(ObjectValue::basic(value.clone())),
            (_, Identifier::Composite(parts)) if self.is_composite() => {
                let embeddable = composite_type.ok_or_else(|| {
                    OrmError::mapping(format!("Composite identifier '{}' has no embeddable", self.role()))
                })?;
                let values = parts.iter().cloned().map(ObjectValue::basic).collect();
                Ok(embeddable.representation.instantiate_composite(embeddable, values))
            }
            _ => Err(OrmError::TypeMismatch(format!(
                "Identifier {} does not match the {} identifier '{}'",
                identifier,
                self.kind_name(),
                self.role()
            ))),
        }
    }

    /// Install `identifier` on `instance`. Non-aggregated identifiers are also
    /// exposed through their individual id attributes.
    pub fn inject(
        &self,
        instance: &EntityInstance,
        descriptor: &ManagedTypeDescriptor,
        identifier: &Identifier,
        composite_type: Option<&ManagedTypeDescriptor>,
    ) -> Result<()> {
        let value = self.to_object_value(identifier, composite_type)?;
        descriptor.representation.set_identifier(instance, value);

        if let (Self::NonAggregatedComposite(non_aggregated), Identifier::Composite(parts)) =
            (self, identifier)
        {
            for (name, part) in non_aggregated.attribute_names.iter().zip(parts) {
                instance.set(name, ObjectValue::basic(part.clone()));
            }
        }
        Ok(())
    }

    /// Read the identifier back from an instance through its property access.
    pub fn extract(
        &self,
        instance: &EntityInstance,
        descriptor: &ManagedTypeDescriptor,
    ) -> Result<Option<Identifier>> {
        match descriptor.representation.get_identifier(instance) {
            Some(value) => value.to_identifier(),
            None => Ok(None),
        }
    }
}
