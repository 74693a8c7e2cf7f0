use log::debug;
use crate::boot::{AttributeKindMapping, ManagedTypeMapping};
use crate::core::{OrmError, Result, SqlType};
use crate::hierarchy::assembly::{IdentifierShape, categorize, identifier_shape};
use crate::hierarchy::{
    AggregatedIdentifierDescriptor, EntityHierarchy, HierarchyId, IdentifierDescriptor,
    InheritanceStrategy, NonAggregatedIdentifierDescriptor, RowIdDescriptor,
    SimpleIdentifierDescriptor, TenantDiscrimination,
};
use crate::metamodel::{
    AttributeKind, BasicAttribute, EmbeddableDetails, EmbeddedContainer, EntityDetails,
    ManagedTypeId, ManagedTypeKind, MutabilityPlan, NavigableRole, PersistentAttribute, TableBinding,
};
use crate::relational::{ColumnId, TableId, TableKind};
use super::{ModelResolver, first_own_level};
use super::attributes::EmbeddableUsage;

impl<'a> ModelResolver<'a> {
    pub(super) fn bind_mapped_superclass(&mut self, mapping: &'a ManagedTypeMapping) -> Result<()> {
        let super_type = match &mapping.superclass {
            Some(name) => Some(self.type_id(name)?),
            None => None,
        };
        let declared_attributes = mapping.attributes.iter().map(|a| a.name.clone()).collect();
        let id = self.add_type(
            &mapping.name,
            NavigableRole::root(&mapping.name),
            ManagedTypeKind::MappedSuperclass { declared_attributes },
            Some(mapping),
        );
        self.managed_types[id.0].super_type = super_type;
        self.type_ids.insert(mapping.name.as_str(), id);
        Ok(())
    }

    /// Create the entity descriptor with its tables and, for a hierarchy
    /// root, the hierarchy and its identifier.
    pub(super) fn bind_entity(&mut self, mapping: &'a ManagedTypeMapping) -> Result<()> {
        let id = match self.parent_entity(mapping)? {
            None => self.bind_root_entity(mapping)?,
            Some(parent) => self.bind_subclass_entity(mapping, parent)?,
        };
        self.bind_secondary_tables(id, mapping)?;
        self.register_entity_name(id, mapping)?;
        self.type_ids.insert(mapping.name.as_str(), id);
        self.entity_order.push(id);
        debug!("Bound tables of entity '{}'", mapping.name);
        Ok(())
    }

    fn register_entity_name(&mut self, id: ManagedTypeId, mapping: &ManagedTypeMapping) -> Result<()> {
        let mut names = vec![mapping.name.clone()];
        if let Some(jpa_name) = &mapping.jpa_name
            && jpa_name != &mapping.name
        {
            names.push(jpa_name.clone());
        }
        for name in names {
            if self.entities_by_name.insert(name.clone(), id).is_some() {
                return Err(OrmError::mapping(format!("Entity name '{}' is used twice", name)));
            }
        }
        Ok(())
    }

    fn entity_details_for(
        &self,
        mapping: &ManagedTypeMapping,
        hierarchy: HierarchyId,
        primary_table: TableId,
    ) -> EntityDetails {
        EntityDetails {
            entity_name: mapping.name.clone(),
            jpa_name: mapping.jpa_name.clone().unwrap_or_else(|| mapping.name.clone()),
            hierarchy,
            primary_table,
            identifier_columns: Vec::new(),
            tables: Vec::new(),
            discriminator_value: None,
            can_read_from_cache: false,
            can_write_to_cache: false,
            enhanced_for_lazy_loading: mapping.enhanced_for_lazy_loading,
            batch_size: mapping.batch_size.unwrap_or(self.config.default_batch_size).max(1),
        }
    }

    fn bind_root_entity(&mut self, mapping: &'a ManagedTypeMapping) -> Result<ManagedTypeId> {
        let table_name = mapping.table.as_deref().unwrap_or(&mapping.name);
        let primary = self.relational.add_table(table_name, TableKind::Primary)?;
        let hierarchy_id = HierarchyId(self.hierarchies.len());
        let role = NavigableRole::root(&mapping.name);
        let details = self.entity_details_for(mapping, hierarchy_id, primary);
        let id = self.add_type(
            &mapping.name,
            role.clone(),
            ManagedTypeKind::Entity(Box::new(details)),
            Some(mapping),
        );
        let super_type = match &mapping.superclass {
            Some(name) => Some(self.type_id(name)?),
            None => None,
        };
        {
            let descriptor = &mut self.managed_types[id.0];
            descriptor.is_root = true;
            descriptor.super_type = super_type;
        }

        let mut identifiers = Vec::new();
        for level in self.chain(mapping)? {
            identifiers.extend(categorize(&level.name, &level.attributes)?.identifiers);
        }
        let shape = identifier_shape(&mapping.name, identifiers)?;
        let identifier = self.bind_identifier(id, &role, primary, shape, mapping)?;
        let columns = identifier.columns().to_vec();
        self.relational.set_primary_key(primary, columns.clone());

        let details = self.entity_details_mut(id)?;
        details.identifier_columns = columns.clone();
        details.tables.push(TableBinding {
            table: primary,
            key_columns: columns,
            contributor: id,
            optional: false,
        });
        self.own_tables.insert(id, primary);

        let strategy = mapping.inheritance.unwrap_or_default();
        let mut hierarchy = EntityHierarchy::new(hierarchy_id, id, strategy, identifier);
        hierarchy.mutable = mapping.mutable;
        hierarchy.optimistic_lock = mapping.optimistic_lock;

        if let Some(discriminator) = &mapping.discriminator {
            let column = self
                .relational
                .add_column(primary, &discriminator.column, discriminator.sql_type, false)?;
            self.discriminator_columns
                .insert(hierarchy_id, (column, discriminator.sql_type));
        }
        if let Some(tenant_column) = &mapping.tenant_column {
            let column = self.relational.add_column(primary, tenant_column, SqlType::Text, false)?;
            hierarchy.tenant = Some(TenantDiscrimination {
                column,
                sql_type: SqlType::Text,
            });
        }
        if let Some(row_id) = &mapping.row_id {
            let column = self.relational.add_column(primary, row_id, SqlType::Integer, false)?;
            hierarchy.row_id = Some(RowIdDescriptor {
                column_name: row_id.clone(),
                column,
            });
        }

        self.hierarchies.push(hierarchy);
        Ok(id)
    }

    fn bind_identifier(
        &mut self,
        entity: ManagedTypeId,
        entity_role: &NavigableRole,
        table: TableId,
        shape: IdentifierShape<'a>,
        mapping: &ManagedTypeMapping,
    ) -> Result<IdentifierDescriptor> {
        let generator = mapping.id_generator.clone().unwrap_or_default();
        match shape {
            IdentifierShape::Simple(attribute) => {
                let AttributeKindMapping::Basic(basic) = &attribute.kind else {
                    return Err(OrmError::mapping(format!(
                        "Identifier '{}.{}' must be basic",
                        mapping.name, attribute.name
                    )));
                };
                if basic.table.is_some() {
                    return Err(OrmError::mapping(format!(
                        "Identifier '{}.{}' must live on the primary table",
                        mapping.name, attribute.name
                    )));
                }
                let column = self.relational.add_column(table, &basic.column, basic.sql_type, false)?;
                Ok(IdentifierDescriptor::Simple(SimpleIdentifierDescriptor {
                    attribute_name: attribute.name.clone(),
                    role: entity_role.append(&attribute.name),
                    column,
                    sql_type: basic.sql_type,
                    generator,
                }))
            }
            IdentifierShape::Aggregated(attribute) => {
                let AttributeKindMapping::Embedded(embedded) = &attribute.kind else {
                    return Err(OrmError::mapping(format!(
                        "Embedded identifier '{}.{}' must be embedded",
                        mapping.name, attribute.name
                    )));
                };
                let role = entity_role.append(&attribute.name);
                let embeddable = self.bind_embeddable(
                    &embedded.embeddable,
                    EmbeddableUsage {
                        role: role.clone(),
                        container: EmbeddedContainer::Identifier { entity },
                        entity,
                        table,
                        column_prefix: embedded.column_prefix.clone(),
                        identifier_part: true,
                    },
                    &mut Vec::new(),
                )?;
                let (columns, sql_types) = self.identifier_part_columns(embeddable)?;
                Ok(IdentifierDescriptor::AggregatedComposite(AggregatedIdentifierDescriptor {
                    attribute_name: attribute.name.clone(),
                    role,
                    embeddable,
                    columns,
                    sql_types,
                    generator,
                }))
            }
            IdentifierShape::NonAggregated(attributes) => {
                let role = entity_role.append("{id}");
                let class_name = mapping
                    .id_class
                    .clone()
                    .unwrap_or_else(|| format!("{}.{{id}}", mapping.name));
                let id_class = self.add_type(
                    &class_name,
                    role.clone(),
                    ManagedTypeKind::Embeddable(EmbeddableDetails {
                        embeddable_name: class_name.clone(),
                        container: EmbeddedContainer::Identifier { entity },
                    }),
                    None,
                );

                let mut parts = Vec::with_capacity(attributes.len());
                let mut columns = Vec::with_capacity(attributes.len());
                let mut sql_types = Vec::with_capacity(attributes.len());
                for (position, attribute) in attributes.iter().enumerate() {
                    let AttributeKindMapping::Basic(basic) = &attribute.kind else {
                        return Err(OrmError::mapping(format!(
                            "Identifier '{}.{}' must be basic",
                            mapping.name, attribute.name
                        )));
                    };
                    let column = self.relational.add_column(table, &basic.column, basic.sql_type, false)?;
                    columns.push(column);
                    sql_types.push(basic.sql_type);
                    parts.push(PersistentAttribute {
                        name: attribute.name.clone(),
                        role: role.append(&attribute.name),
                        declaring_type: id_class,
                        position,
                        nullable: false,
                        insertable: attribute.insertable,
                        updatable: false,
                        version: false,
                        natural_id: false,
                        mutability: MutabilityPlan::Immutable,
                        kind: AttributeKind::Basic(BasicAttribute {
                            column,
                            sql_type: basic.sql_type,
                            converter: basic.converter.clone(),
                        }),
                    });
                }
                self.managed_types[id_class.0].set_attributes(parts)?;

                Ok(IdentifierDescriptor::NonAggregatedComposite(NonAggregatedIdentifierDescriptor {
                    role,
                    id_class,
                    attribute_names: attributes.iter().map(|a| a.name.clone()).collect(),
                    columns,
                    sql_types,
                }))
            }
        }
    }

    /// Columns of an identifier embeddable in part order.
    fn identifier_part_columns(&self, embeddable: ManagedTypeId) -> Result<(Vec<ColumnId>, Vec<SqlType>)> {
        let mut columns = Vec::new();
        let mut sql_types = Vec::new();
        for attribute in self.managed_types[embeddable.0].attributes() {
            match &attribute.kind {
                AttributeKind::Basic(basic) => {
                    columns.push(basic.column);
                    sql_types.push(basic.sql_type);
                }
                _ => {
                    return Err(OrmError::mapping(format!(
                        "Composite identifier part '{}' must be basic",
                        attribute.role
                    )));
                }
            }
        }
        Ok((columns, sql_types))
    }

    fn bind_subclass_entity(
        &mut self,
        mapping: &'a ManagedTypeMapping,
        parent: ManagedTypeId,
    ) -> Result<ManagedTypeId> {
        let parent_details = self.entity_details(parent)?.clone();
        let hierarchy_id = parent_details.hierarchy;
        let strategy = self.hierarchies[hierarchy_id.0].strategy;

        if let Some(declared) = mapping.inheritance
            && declared != strategy
        {
            return Err(OrmError::mapping(format!(
                "Entity '{}' declares inheritance {:?} but its hierarchy uses {:?}",
                mapping.name, declared, strategy
            )));
        }
        let chain = self.chain(mapping)?;
        for level in &chain[first_own_level(&chain)..] {
            if !categorize(&level.name, &level.attributes)?.identifiers.is_empty() {
                return Err(OrmError::mapping(format!(
                    "Subclass '{}' cannot declare identifier attributes (declared on '{}')",
                    mapping.name, level.name
                )));
            }
        }
        if mapping.discriminator.is_some() {
            return Err(OrmError::mapping(format!(
                "Discriminator column of '{}' must be declared on the hierarchy root",
                mapping.name
            )));
        }

        let id = self.next_type_id();
        let parent_own = self.own_table(parent)?;
        let mut details = self.entity_details_for(mapping, hierarchy_id, parent_details.primary_table);
        let own_table = match strategy {
            InheritanceStrategy::SingleTable => {
                let root_table = &self.relational.table(parent_details.primary_table).name;
                if let Some(table) = &mapping.table
                    && table != root_table
                {
                    return Err(OrmError::mapping(format!(
                        "Single-table subclass '{}' must use table '{}', not '{}'",
                        mapping.name, root_table, table
                    )));
                }
                details.identifier_columns = parent_details.identifier_columns.clone();
                details.tables = parent_details.tables.clone();
                parent_own
            }
            InheritanceStrategy::Joined => {
                let table_name = mapping.table.as_deref().unwrap_or(&mapping.name);
                let table = self.relational.add_table(table_name, TableKind::JoinedSubclass)?;
                let key_columns = self.copy_key_columns(table, &parent_details.identifier_columns)?;
                let parent_key = parent_details
                    .tables
                    .iter()
                    .find(|binding| binding.table == parent_own)
                    .map(|binding| binding.key_columns.clone())
                    .unwrap_or_else(|| parent_details.identifier_columns.clone());
                self.relational.add_foreign_key(
                    table,
                    parent_own,
                    key_columns.iter().copied().zip(parent_key).collect(),
                )?;
                details.identifier_columns = parent_details.identifier_columns.clone();
                details.tables = parent_details.tables.clone();
                details.tables.push(TableBinding {
                    table,
                    key_columns,
                    contributor: id,
                    optional: false,
                });
                table
            }
            InheritanceStrategy::TablePerClass => {
                let table_name = mapping.table.as_deref().unwrap_or(&mapping.name);
                let table = self.relational.add_table(table_name, TableKind::Primary)?;
                let key_columns = self.copy_key_columns(table, &parent_details.identifier_columns)?;
                details.primary_table = table;
                details.identifier_columns = key_columns.clone();
                details.tables = vec![TableBinding {
                    table,
                    key_columns,
                    contributor: id,
                    optional: false,
                }];
                table
            }
        };

        let added = self.add_type(
            &mapping.name,
            NavigableRole::root(&mapping.name),
            ManagedTypeKind::Entity(Box::new(details)),
            Some(mapping),
        );
        self.managed_types[added.0].super_type = Some(parent);
        self.own_tables.insert(added, own_table);
        self.hierarchies[hierarchy_id.0].entities.push(added);
        Ok(added)
    }

    /// Duplicate identifier columns (same names and types) onto `table` as its primary key.
    fn copy_key_columns(&mut self, table: TableId, identifier_columns: &[ColumnId]) -> Result<Vec<ColumnId>> {
        let mut key_columns = Vec::with_capacity(identifier_columns.len());
        for column in identifier_columns {
            let source = self.relational.column(*column).clone();
            key_columns.push(self.relational.add_column(table, &source.name, source.sql_type, false)?);
        }
        self.relational.set_primary_key(table, key_columns.clone());
        Ok(key_columns)
    }

    fn bind_secondary_tables(&mut self, entity: ManagedTypeId, mapping: &ManagedTypeMapping) -> Result<()> {
        if mapping.secondary_tables.is_empty() {
            return Ok(());
        }
        let own = self.own_table(entity)?;
        let details = self.entity_details(entity)?;
        let identifier_columns = details.identifier_columns.clone();
        let own_key = details
            .tables
            .iter()
            .find(|binding| binding.table == own)
            .map(|binding| binding.key_columns.clone())
            .unwrap_or_else(|| identifier_columns.clone());

        for secondary in &mapping.secondary_tables {
            if secondary.key_columns.len() != identifier_columns.len() {
                return Err(OrmError::mapping(format!(
                    "Secondary table '{}' of '{}' has {} key columns, expected {}",
                    secondary.name,
                    mapping.name,
                    secondary.key_columns.len(),
                    identifier_columns.len()
                )));
            }
            let table = self.relational.add_table(&secondary.name, TableKind::Secondary)?;
            let mut key_columns = Vec::with_capacity(secondary.key_columns.len());
            for (name, source) in secondary.key_columns.iter().zip(&identifier_columns) {
                let sql_type = self.relational.column(*source).sql_type;
                key_columns.push(self.relational.add_column(table, name, sql_type, false)?);
            }
            self.relational.set_primary_key(table, key_columns.clone());
            self.relational.add_foreign_key(
                table,
                own,
                key_columns.iter().copied().zip(own_key.iter().copied()).collect(),
            )?;
            self.entity_details_mut(entity)?.tables.push(TableBinding {
                table,
                key_columns,
                contributor: entity,
                optional: true,
            });
        }
        Ok(())
    }
}
