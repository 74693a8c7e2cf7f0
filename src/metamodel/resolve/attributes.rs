use crate::boot::{
    AttributeKindMapping, AttributeMapping, ManagedTypeKindMapping, PluralMapping, ToOneMapping,
};
use crate::core::{OrmError, Result, SqlType};
use crate::hierarchy::assembly::categorize;
use crate::hierarchy::{IdentifierDescriptor, InheritanceStrategy};
use crate::metamodel::{
    AttributeKind, BasicAttribute, CollectionElement, CollectionId, EmbeddableDetails,
    EmbeddedAttribute, EmbeddedContainer, ManagedTypeId, ManagedTypeKind, MutabilityPlan,
    NavigableRole, PersistentAttribute, PersistentCollectionDescriptor, PluralAttribute,
    ToOneAttribute, ToOneCardinality, ToOneKey,
};
use crate::relational::{ColumnId, TableId};
use super::{ModelResolver, first_own_level};
use super::deferred::DeferredTask;

/// Where an attribute is being bound.
#[derive(Debug, Clone)]
pub(super) struct AttributeContext {
    /// Container whose state array receives the attribute.
    pub owner: ManagedTypeId,
    /// Enclosing entity, used for secondary tables and `@MapsId`.
    pub entity: ManagedTypeId,
    pub declaring_type: ManagedTypeId,
    pub role: NavigableRole,
    pub position: usize,
    pub table: TableId,
    pub column_prefix: String,
    pub identifier_part: bool,
}

/// One usage of an embeddable; every usage gets its own descriptor.
#[derive(Debug, Clone)]
pub(super) struct EmbeddableUsage {
    pub role: NavigableRole,
    pub container: EmbeddedContainer,
    pub entity: ManagedTypeId,
    pub table: TableId,
    pub column_prefix: String,
    pub identifier_part: bool,
}

impl<'a> ModelResolver<'a> {
    /// Build the state array of `entity`: inherited attributes first, then
    /// each level's declared attributes in alphabetical order.
    pub(super) fn bind_entity_attributes(&mut self, entity: ManagedTypeId) -> Result<()> {
        let mapping = self.mapping_of(entity)?;
        let chain = self.chain(mapping)?;
        let strategy = self.strategy_of(entity)?;
        let own_table = self.own_table(entity)?;
        let entity_role = self.managed_types[entity.0].role.clone();
        let root_level = chain
            .iter()
            .position(|level| level.kind == ManagedTypeKindMapping::Entity)
            .unwrap_or(chain.len() - 1);

        let parent = self.parent_entity(mapping)?;
        let (mut state, first_level) = match parent {
            Some(parent) if strategy != InheritanceStrategy::TablePerClass => {
                (self.managed_types[parent.0].attributes().to_vec(), first_own_level(&chain))
            }
            _ => (Vec::new(), 0),
        };

        let mut stack = Vec::new();
        for (level_index, level) in chain.iter().enumerate().skip(first_level) {
            let declaring_type = if level_index == chain.len() - 1 {
                entity
            } else {
                self.type_id(&level.name)?
            };
            let categorized = categorize(&level.name, &level.attributes)?;
            for attribute in categorized.non_identifier() {
                if level_index > root_level && (attribute.version || attribute.natural_id) {
                    return Err(OrmError::mapping(format!(
                        "Attribute '{}.{}' must be declared on the hierarchy root to be a version or natural id",
                        level.name, attribute.name
                    )));
                }
                let context = AttributeContext {
                    owner: entity,
                    entity,
                    declaring_type,
                    role: entity_role.append(&attribute.name),
                    position: state.len(),
                    table: own_table,
                    column_prefix: String::new(),
                    identifier_part: false,
                };
                state.push(self.bind_attribute(attribute, &context, &mut stack)?);
            }
        }

        self.managed_types[entity.0].set_attributes(state)
    }

    pub(super) fn bind_attribute(
        &mut self,
        attribute: &AttributeMapping,
        context: &AttributeContext,
        stack: &mut Vec<String>,
    ) -> Result<PersistentAttribute> {
        let (kind, nullable, mutability) = match &attribute.kind {
            AttributeKindMapping::Basic(basic) => {
                let table = match &basic.table {
                    Some(name) => self.secondary_table(context.entity, name)?,
                    None => context.table,
                };
                let column_name = format!("{}{}", context.column_prefix, basic.column);
                let nullable = basic.nullable && !context.identifier_part;
                let column = self.relational.add_column(table, &column_name, basic.sql_type, nullable)?;
                let mutability = if attribute.immutable || basic.sql_type != SqlType::Binary {
                    MutabilityPlan::Immutable
                } else {
                    MutabilityPlan::Mutable
                };
                let kind = AttributeKind::Basic(BasicAttribute {
                    column,
                    sql_type: basic.sql_type,
                    converter: basic.converter.clone(),
                });
                (kind, nullable, mutability)
            }
            AttributeKindMapping::Embedded(embedded) => {
                let embeddable = self.bind_embeddable(
                    &embedded.embeddable,
                    EmbeddableUsage {
                        role: context.role.clone(),
                        container: EmbeddedContainer::Attribute {
                            owner: context.owner,
                            attribute: attribute.name.clone(),
                        },
                        entity: context.entity,
                        table: context.table,
                        column_prefix: format!("{}{}", context.column_prefix, embedded.column_prefix),
                        identifier_part: context.identifier_part,
                    },
                    stack,
                )?;
                let mutability = if attribute.immutable {
                    MutabilityPlan::Immutable
                } else {
                    MutabilityPlan::Mutable
                };
                (AttributeKind::Embedded(EmbeddedAttribute { embeddable }), true, mutability)
            }
            AttributeKindMapping::ManyToOne(to_one) => {
                self.bind_to_one(attribute, to_one, ToOneCardinality::ManyToOne, context)?
            }
            AttributeKindMapping::OneToOne(to_one) => {
                self.bind_to_one(attribute, to_one, ToOneCardinality::OneToOne, context)?
            }
            AttributeKindMapping::Plural(plural) => {
                if self.managed_types[context.owner.0].is_embeddable() {
                    return Err(OrmError::UnsupportedOperation(format!(
                        "Plural attribute '{}' inside an embeddable",
                        context.role
                    )));
                }
                let collection = self.collection_for(attribute, plural, context);
                let kind = AttributeKind::Plural(PluralAttribute {
                    collection,
                    classification: plural.classification,
                });
                (kind, true, MutabilityPlan::Mutable)
            }
            AttributeKindMapping::Any => {
                return Err(OrmError::UnsupportedOperation(format!(
                    "<any> mapping of '{}'",
                    context.role
                )));
            }
            AttributeKindMapping::DynamicComponent => {
                return Err(OrmError::UnsupportedOperation(format!(
                    "<dynamic-component> mapping of '{}'",
                    context.role
                )));
            }
        };

        if context.identifier_part && !matches!(kind, AttributeKind::Basic(_)) {
            return Err(OrmError::mapping(format!(
                "Composite identifier part '{}' must be basic",
                context.role
            )));
        }

        Ok(PersistentAttribute {
            name: attribute.name.clone(),
            role: context.role.clone(),
            declaring_type: context.declaring_type,
            position: context.position,
            nullable,
            insertable: attribute.insertable,
            updatable: attribute.updatable && !context.identifier_part,
            version: attribute.version,
            natural_id: attribute.natural_id,
            mutability,
            kind,
        })
    }

    fn secondary_table(&self, entity: ManagedTypeId, name: &str) -> Result<TableId> {
        self.entity_details(entity)?
            .tables
            .iter()
            .filter(|binding| binding.optional)
            .map(|binding| binding.table)
            .find(|table| self.relational.table(*table).name == name)
            .ok_or_else(|| {
                OrmError::mapping(format!(
                    "Table '{}' is not a secondary table of '{}'",
                    name, self.managed_types[entity.0].name
                ))
            })
    }

    fn bind_to_one(
        &mut self,
        attribute: &AttributeMapping,
        mapping: &ToOneMapping,
        cardinality: ToOneCardinality,
        context: &AttributeContext,
    ) -> Result<(AttributeKind, bool, MutabilityPlan)> {
        let target = self.entity_id(&mapping.target)?;

        let key = if let Some(mapped_by) = &mapping.mapped_by {
            if cardinality == ToOneCardinality::ManyToOne {
                return Err(OrmError::mapping(format!(
                    "Many-to-one '{}' cannot be mapped by the other side",
                    context.role
                )));
            }
            self.deferred.push_back(DeferredTask::InverseToOne {
                role: context.role.clone(),
                target,
                mapped_by: mapped_by.clone(),
            });
            ToOneKey::Pending
        } else {
            let target_details = self.entity_details(target)?;
            let target_table = target_details.primary_table;
            let target_columns = target_details.identifier_columns.clone();

            let columns = match &attribute.maps_id {
                Some(id_attribute) => self.maps_id_columns(context.entity, id_attribute)?,
                None => {
                    let names: Vec<String> = if mapping.join_columns.is_empty() {
                        target_columns
                            .iter()
                            .map(|c| format!("{}_{}", attribute.name, self.relational.column(*c).name))
                            .collect()
                    } else {
                        mapping.join_columns.clone()
                    };
                    if names.len() != target_columns.len() {
                        return Err(OrmError::mapping(format!(
                            "'{}' declares {} join columns but '{}' has {} identifier columns",
                            context.role,
                            names.len(),
                            mapping.target,
                            target_columns.len()
                        )));
                    }
                    let mut columns = Vec::with_capacity(names.len());
                    for (name, target_column) in names.iter().zip(&target_columns) {
                        let sql_type = self.relational.column(*target_column).sql_type;
                        let name = format!("{}{}", context.column_prefix, name);
                        columns.push(self.relational.add_column(
                            context.table,
                            &name,
                            sql_type,
                            mapping.optional,
                        )?);
                    }
                    columns
                }
            };
            if columns.len() != target_columns.len() {
                return Err(OrmError::mapping(format!(
                    "'{}' maps {} identifier columns onto '{}' which has {}",
                    context.role,
                    columns.len(),
                    mapping.target,
                    target_columns.len()
                )));
            }
            let referring_table = self.relational.column(columns[0]).table;
            let foreign_key = self.relational.add_foreign_key(
                referring_table,
                target_table,
                columns.iter().copied().zip(target_columns).collect(),
            )?;
            ToOneKey::Referring { columns, foreign_key }
        };

        let kind = AttributeKind::ToOne(ToOneAttribute {
            target,
            cardinality,
            fetch: mapping.fetch,
            not_found: mapping.not_found,
            mapped_by: mapping.mapped_by.clone(),
            maps_id: attribute.maps_id.clone(),
            key,
        });
        Ok((kind, mapping.optional, MutabilityPlan::Immutable))
    }

    /// Identifier columns shared by a `@MapsId` association: the whole
    /// identifier, or one part of a composite identifier.
    fn maps_id_columns(&self, entity: ManagedTypeId, id_attribute: &str) -> Result<Vec<ColumnId>> {
        let hierarchy = &self.hierarchies[self.entity_details(entity)?.hierarchy.0];
        let not_found = || {
            OrmError::mapping(format!(
                "@MapsId('{}') does not name an identifier attribute of '{}'",
                id_attribute, self.managed_types[entity.0].name
            ))
        };
        let columns = self.entity_details(entity)?.identifier_columns.clone();
        match &hierarchy.identifier {
            IdentifierDescriptor::Simple(simple) if simple.attribute_name == id_attribute => Ok(columns),
            IdentifierDescriptor::Simple(_) => Err(not_found()),
            IdentifierDescriptor::AggregatedComposite(aggregated) => {
                if aggregated.attribute_name == id_attribute {
                    return Ok(columns);
                }
                let part = self.managed_types[aggregated.embeddable.0]
                    .find_attribute(id_attribute)
                    .ok_or_else(not_found)?;
                Ok(vec![columns[part.position]])
            }
            IdentifierDescriptor::NonAggregatedComposite(non_aggregated) => {
                let position = non_aggregated
                    .attribute_names
                    .iter()
                    .position(|name| name == id_attribute)
                    .ok_or_else(not_found)?;
                Ok(vec![columns[position]])
            }
        }
    }

    fn collection_for(
        &mut self,
        attribute: &AttributeMapping,
        plural: &PluralMapping,
        context: &AttributeContext,
    ) -> CollectionId {
        if let Some(existing) = self.collections_by_role.get(&context.role) {
            return *existing;
        }
        let id = CollectionId(self.collections.len());
        self.collections.push(PersistentCollectionDescriptor {
            id,
            role: context.role.clone(),
            owner: context.entity,
            attribute_name: attribute.name.clone(),
            classification: plural.classification,
            collection_table: None,
            key: None,
            element: CollectionElement::Unresolved,
            index: None,
            identifier: None,
            batch_size: plural.batch_size.unwrap_or(self.config.default_batch_size).max(1),
            inverse: plural.inverse || plural.mapped_by.is_some(),
            orphan_delete: plural.orphan_delete,
            extra_lazy: plural.extra_lazy,
            fetch: plural.fetch,
            mapped_by: plural.mapped_by.clone(),
        });
        self.collections_by_role.insert(context.role.clone(), id);
        self.deferred.push_back(DeferredTask::FinishCollection {
            collection: id,
            mapping: plural.clone(),
        });
        id
    }

    /// Create a per-usage embeddable descriptor and bind its attributes.
    pub(super) fn bind_embeddable(
        &mut self,
        name: &str,
        usage: EmbeddableUsage,
        stack: &mut Vec<String>,
    ) -> Result<ManagedTypeId> {
        let mapping = *self
            .embeddables
            .get(name)
            .ok_or_else(|| OrmError::mapping(format!("Unknown embeddable '{}' used by '{}'", name, usage.role)))?;
        if stack.iter().any(|entry| entry == name) {
            return Err(OrmError::mapping(format!(
                "Embeddable '{}' contains itself through '{}'",
                name, usage.role
            )));
        }
        stack.push(name.to_string());

        let categorized = categorize(name, &mapping.attributes)?;
        if !categorized.identifiers.is_empty() || categorized.version.is_some() {
            return Err(OrmError::mapping(format!(
                "Embeddable '{}' cannot declare identifier or version attributes",
                name
            )));
        }

        let id = self.add_type(
            name,
            usage.role.clone(),
            ManagedTypeKind::Embeddable(EmbeddableDetails {
                embeddable_name: name.to_string(),
                container: usage.container.clone(),
            }),
            Some(mapping),
        );

        let mut attributes = Vec::with_capacity(mapping.attributes.len());
        for attribute in categorized.non_identifier() {
            let context = AttributeContext {
                owner: id,
                entity: usage.entity,
                declaring_type: id,
                role: usage.role.append(&attribute.name),
                position: attributes.len(),
                table: usage.table,
                column_prefix: usage.column_prefix.clone(),
                identifier_part: usage.identifier_part,
            };
            attributes.push(self.bind_attribute(attribute, &context, stack)?);
        }
        self.managed_types[id.0].set_attributes(attributes)?;

        stack.pop();
        Ok(id)
    }
}
