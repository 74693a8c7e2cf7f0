use crate::boot::{AttributeKindMapping, AttributeMapping};
use crate::core::{OrmError, Result, SqlType, Value};
use crate::metamodel::{AttributeKind, DiscriminatorValue, ManagedTypeDescriptor, ManagedTypeId};
use crate::relational::ColumnId;
use super::{
    DiscriminatorDescriptor, NaturalIdAttribute, NaturalIdDescriptor, NaturalIdPersistenceType,
    VersionDescriptor,
};

/// Attributes of one managed type split by how they participate in the
/// hierarchy. Precedence: version, identifier, maps-id association, general.
#[derive(Debug, Default)]
pub(crate) struct CategorizedAttributes<'a> {
    pub version: Option<&'a AttributeMapping>,
    pub identifiers: Vec<&'a AttributeMapping>,
    pub maps_id: Vec<&'a AttributeMapping>,
    pub general: Vec<&'a AttributeMapping>,
}

impl<'a> CategorizedAttributes<'a> {
    /// State-array contributors of this level, alphabetical.
    pub fn non_identifier(&self) -> Vec<&'a AttributeMapping> {
        let mut attributes: Vec<&'a AttributeMapping> = self
            .version
            .iter()
            .copied()
            .chain(self.maps_id.iter().copied())
            .chain(self.general.iter().copied())
            .collect();
        attributes.sort_by(|a, b| a.name.cmp(&b.name));
        attributes
    }
}

pub(crate) fn categorize<'a>(
    type_name: &str,
    attributes: &'a [AttributeMapping],
) -> Result<CategorizedAttributes<'a>> {
    let mut categorized = CategorizedAttributes::default();
    for attribute in attributes {
        let is_identifier = attribute.id || attribute.embedded_id;
        if attribute.version {
            if is_identifier {
                return Err(OrmError::mapping(format!(
                    "Attribute '{}.{}' is marked as both identifier and version",
                    type_name, attribute.name
                )));
            }
            if let Some(existing) = categorized.version {
                return Err(OrmError::mapping(format!(
                    "Multiple version attributes on '{}': '{}' and '{}'",
                    type_name, existing.name, attribute.name
                )));
            }
            categorized.version = Some(attribute);
        } else if is_identifier {
            categorized.identifiers.push(attribute);
        } else if attribute.maps_id.is_some() {
            categorized.maps_id.push(attribute);
        } else {
            categorized.general.push(attribute);
        }
    }
    Ok(categorized)
}

#[derive(Debug)]
pub(crate) enum IdentifierShape<'a> {
    Simple(&'a AttributeMapping),
    Aggregated(&'a AttributeMapping),
    /// Id attributes in alphabetical order.
    NonAggregated(Vec<&'a AttributeMapping>),
}

pub(crate) fn identifier_shape<'a>(
    entity: &str,
    mut identifiers: Vec<&'a AttributeMapping>,
) -> Result<IdentifierShape<'a>> {
    match identifiers.len() {
        0 => Err(OrmError::mapping(format!("No identifier specified for entity '{}'", entity))),
        1 => {
            let attribute = identifiers[0];
            match &attribute.kind {
                AttributeKindMapping::Embedded(_) => Ok(IdentifierShape::Aggregated(attribute)),
                AttributeKindMapping::Basic(_) if !attribute.embedded_id => {
                    Ok(IdentifierShape::Simple(attribute))
                }
                _ => Err(OrmError::mapping(format!(
                    "Identifier attribute '{}.{}' must be basic or embedded",
                    entity, attribute.name
                ))),
            }
        }
        _ => {
            if let Some(embedded) = identifiers.iter().find(|a| a.embedded_id) {
                return Err(OrmError::mapping(format!(
                    "Entity '{}' combines @EmbeddedId '{}' with other identifier attributes",
                    entity, embedded.name
                )));
            }
            if let Some(complex) = identifiers
                .iter()
                .find(|a| !matches!(a.kind, AttributeKindMapping::Basic(_)))
            {
                return Err(OrmError::mapping(format!(
                    "Identifier attribute '{}.{}' of a non-aggregated identifier must be basic",
                    entity, complex.name
                )));
            }
            identifiers.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(IdentifierShape::NonAggregated(identifiers))
        }
    }
}

pub(crate) fn version_descriptor(root: &ManagedTypeDescriptor) -> Result<Option<VersionDescriptor>> {
    let mut versions = root.attributes().iter().filter(|a| a.version);
    let Some(attribute) = versions.next() else {
        return Ok(None);
    };
    if let Some(second) = versions.next() {
        return Err(OrmError::mapping(format!(
            "Multiple version attributes in hierarchy of '{}': '{}' and '{}'",
            root.name, attribute.name, second.name
        )));
    }
    match &attribute.kind {
        AttributeKind::Basic(basic) => Ok(Some(VersionDescriptor {
            attribute_name: attribute.name.clone(),
            position: attribute.position,
            column: basic.column,
            sql_type: basic.sql_type,
        })),
        _ => Err(OrmError::mapping(format!(
            "Version attribute '{}' must be basic",
            attribute.role
        ))),
    }
}

pub(crate) fn natural_id_descriptor(
    root: &ManagedTypeDescriptor,
    version: Option<&VersionDescriptor>,
    mutable: bool,
) -> Result<Option<NaturalIdDescriptor>> {
    let attributes: Vec<NaturalIdAttribute> = root
        .attributes()
        .iter()
        .filter(|a| a.natural_id)
        .map(|a| NaturalIdAttribute {
            name: a.name.clone(),
            position: a.position,
        })
        .collect();
    if attributes.is_empty() {
        return Ok(None);
    }
    if let Some(version) = version
        && attributes.iter().any(|a| a.position == version.position)
    {
        return Err(OrmError::mapping(format!(
            "Version attribute '{}' of '{}' cannot be part of the natural id",
            version.attribute_name, root.name
        )));
    }
    let persistence_type = if attributes.len() > 1 {
        NaturalIdPersistenceType::Embeddable
    } else {
        NaturalIdPersistenceType::Basic
    };
    Ok(Some(NaturalIdDescriptor {
        attributes,
        mutable,
        persistence_type,
    }))
}

/// Parse a mapped discriminator literal against the column type.
pub(crate) fn parse_discriminator_value(raw: &str, sql_type: SqlType) -> Result<DiscriminatorValue> {
    match raw {
        "null" => return Ok(DiscriminatorValue::Null),
        "not null" => return Ok(DiscriminatorValue::NotNull),
        _ => {}
    }
    let invalid = || OrmError::mapping(format!("Discriminator value '{}' is not a valid {}", raw, sql_type));
    let value = match sql_type {
        SqlType::Integer => Value::Integer(raw.trim().parse().map_err(|_| invalid())?),
        SqlType::Float => Value::Float(raw.trim().parse().map_err(|_| invalid())?),
        SqlType::Boolean => Value::Boolean(raw.trim().parse().map_err(|_| invalid())?),
        SqlType::Text => Value::Text(raw.to_string()),
        SqlType::Binary => return Err(invalid()),
    };
    Ok(DiscriminatorValue::Literal(value))
}

/// One entity's contribution to the discriminator map.
pub(crate) struct DiscriminatorEntry<'a> {
    pub entity: ManagedTypeId,
    pub entity_name: &'a str,
    pub value: Option<&'a str>,
}

/// Build the discriminator-to-entity map. Text discriminators default to the
/// entity name; other types require an explicit value.
pub(crate) fn assemble_discriminator(
    column: ColumnId,
    sql_type: SqlType,
    entries: &[DiscriminatorEntry<'_>],
) -> Result<(DiscriminatorDescriptor, Vec<(ManagedTypeId, DiscriminatorValue)>)> {
    let mut descriptor = DiscriminatorDescriptor::new(column, sql_type);
    let mut assigned = Vec::with_capacity(entries.len());
    for entry in entries {
        let value = match entry.value {
            Some(raw) => parse_discriminator_value(raw, sql_type)?,
            None if sql_type == SqlType::Text => {
                DiscriminatorValue::Literal(Value::Text(entry.entity_name.to_string()))
            }
            None => {
                return Err(OrmError::mapping(format!(
                    "No discriminator value mapped for entity '{}'",
                    entry.entity_name
                )));
            }
        };
        if let Some(previous) = descriptor.register(value.clone(), entry.entity) {
            if previous != entry.entity {
                return Err(OrmError::mapping(format!(
                    "Discriminator value {:?} of '{}' is already used by another entity",
                    value, entry.entity_name
                )));
            }
        }
        assigned.push((entry.entity, value));
    }
    Ok((descriptor, assigned))
}
