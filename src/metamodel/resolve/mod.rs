//! Boot-to-runtime model resolution.
//!
//! Resolution runs in fixed passes over a dependency-ordered build plan:
//! entity tables and identifiers, then attributes (supertypes first), then a
//! deferred queue for references that need the other side resolved first
//! (`mapped_by` borrowing, collection keys and elements), and finally the
//! per-hierarchy descriptors.

mod attributes;
mod deferred;
mod plan;
mod tables;

use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{Level, event, info_span};
use crate::boot::{BootModel, ManagedTypeKindMapping, ManagedTypeMapping};
use crate::cache::RegionFactory;
use crate::config::ModelConfig;
use crate::core::{OrmError, Result, SqlType};
use crate::hierarchy::assembly::{
    DiscriminatorEntry, assemble_discriminator, natural_id_descriptor, version_descriptor,
};
use crate::hierarchy::{EntityHierarchy, HierarchyId, InheritanceStrategy};
use crate::relational::{ColumnId, RelationalModel, TableId};
use super::{
    CollectionId, DynamicMapRepresentation, EntityDetails, ManagedTypeDescriptor, ManagedTypeId,
    ManagedTypeKind, NavigableRef, NavigableRole, PersistentCollectionDescriptor,
    RepresentationStrategy, RuntimeModel,
};

use deferred::DeferredTask;
use plan::BuildPlan;

pub(crate) struct ModelResolver<'a> {
    boot: &'a BootModel,
    config: ModelConfig,
    regions: Option<&'a dyn RegionFactory>,
    representation: Arc<dyn RepresentationStrategy>,
    relational: RelationalModel,
    managed_types: Vec<ManagedTypeDescriptor>,
    /// Boot mapping of each managed type, parallel to `managed_types`.
    /// Synthesized id-class embeddables have none.
    mappings: Vec<Option<&'a ManagedTypeMapping>>,
    type_ids: HashMap<&'a str, ManagedTypeId>,
    embeddables: HashMap<&'a str, &'a ManagedTypeMapping>,
    entities_by_name: HashMap<String, ManagedTypeId>,
    entity_order: Vec<ManagedTypeId>,
    hierarchies: Vec<EntityHierarchy>,
    discriminator_columns: HashMap<HierarchyId, (ColumnId, SqlType)>,
    /// Table holding the columns declared by each entity.
    own_tables: HashMap<ManagedTypeId, TableId>,
    collections: Vec<PersistentCollectionDescriptor>,
    collections_by_role: HashMap<NavigableRole, CollectionId>,
    deferred: VecDeque<DeferredTask>,
}

impl<'a> ModelResolver<'a> {
    pub(crate) fn new(
        boot: &'a BootModel,
        config: ModelConfig,
        regions: Option<&'a dyn RegionFactory>,
    ) -> Self {
        Self {
            boot,
            config,
            regions,
            representation: Arc::new(DynamicMapRepresentation),
            relational: RelationalModel::new(),
            managed_types: Vec::new(),
            mappings: Vec::new(),
            type_ids: HashMap::new(),
            embeddables: HashMap::new(),
            entities_by_name: HashMap::new(),
            entity_order: Vec::new(),
            hierarchies: Vec::new(),
            discriminator_columns: HashMap::new(),
            own_tables: HashMap::new(),
            collections: Vec::new(),
            collections_by_role: HashMap::new(),
            deferred: VecDeque::new(),
        }
    }

    pub(crate) fn resolve(mut self) -> Result<RuntimeModel> {
        let span = info_span!("model.resolve", types = self.boot.types.len());
        let _enter = span.enter();

        let plan = BuildPlan::compute(self.boot)?;
        self.embeddables = plan.embeddables;

        for mapping in &plan.ordered {
            match mapping.kind {
                ManagedTypeKindMapping::MappedSuperclass => self.bind_mapped_superclass(mapping)?,
                ManagedTypeKindMapping::Entity => self.bind_entity(mapping)?,
                ManagedTypeKindMapping::Embeddable => {}
            }
        }

        for entity in self.entity_order.clone() {
            self.bind_entity_attributes(entity)?;
        }

        self.drain_deferred()?;
        self.finish_hierarchies()?;
        self.link_sub_types();
        let navigables = self.register_navigables();

        event!(
            Level::INFO,
            entities = self.entity_order.len(),
            hierarchies = self.hierarchies.len(),
            collections = self.collections.len(),
            tables = self.relational.tables().len(),
            "runtime model resolved"
        );

        Ok(RuntimeModel {
            relational: self.relational,
            managed_types: self.managed_types,
            entities_by_name: self.entities_by_name,
            hierarchies: self.hierarchies,
            collections: self.collections,
            navigables,
            config: self.config,
        })
    }

    fn next_type_id(&self) -> ManagedTypeId {
        ManagedTypeId(self.managed_types.len())
    }

    fn add_type(
        &mut self,
        name: &str,
        role: NavigableRole,
        kind: ManagedTypeKind,
        mapping: Option<&'a ManagedTypeMapping>,
    ) -> ManagedTypeId {
        let id = self.next_type_id();
        self.managed_types.push(ManagedTypeDescriptor::new(
            id,
            name,
            role,
            kind,
            self.representation.clone(),
        ));
        self.mappings.push(mapping);
        id
    }

    fn mapping_of(&self, id: ManagedTypeId) -> Result<&'a ManagedTypeMapping> {
        self.mappings[id.0].ok_or_else(|| {
            OrmError::mapping(format!(
                "Managed type '{}' has no boot mapping",
                self.managed_types[id.0].name
            ))
        })
    }

    fn type_id(&self, name: &str) -> Result<ManagedTypeId> {
        self.type_ids
            .get(name)
            .copied()
            .ok_or_else(|| OrmError::UnresolvedReference(format!("Managed type '{}' is not built", name)))
    }

    fn entity_id(&self, name: &str) -> Result<ManagedTypeId> {
        self.entities_by_name
            .get(name)
            .copied()
            .ok_or_else(|| OrmError::mapping(format!("Unknown entity '{}'", name)))
    }

    fn entity_details(&self, id: ManagedTypeId) -> Result<&EntityDetails> {
        self.managed_types[id.0].expect_entity()
    }

    fn entity_details_mut(&mut self, id: ManagedTypeId) -> Result<&mut EntityDetails> {
        let name = self.managed_types[id.0].name.clone();
        self.managed_types[id.0]
            .entity_details_mut()
            .ok_or_else(|| OrmError::mapping(format!("Managed type '{}' is not an entity", name)))
    }

    fn own_table(&self, entity: ManagedTypeId) -> Result<TableId> {
        self.own_tables.get(&entity).copied().ok_or_else(|| {
            OrmError::UnresolvedReference(format!(
                "Tables of '{}' are not bound",
                self.managed_types[entity.0].name
            ))
        })
    }

    fn strategy_of(&self, entity: ManagedTypeId) -> Result<InheritanceStrategy> {
        let hierarchy = self.entity_details(entity)?.hierarchy;
        Ok(self.hierarchies[hierarchy.0].strategy)
    }

    /// Nearest entity ancestor, looking through mapped superclasses.
    fn parent_entity(&self, mapping: &ManagedTypeMapping) -> Result<Option<ManagedTypeId>> {
        let mut current = mapping;
        while let Some(superclass) = &current.superclass {
            let parent = self.type_id(superclass)?;
            if self.managed_types[parent.0].is_entity() {
                return Ok(Some(parent));
            }
            current = self.mapping_of(parent)?;
        }
        Ok(None)
    }

    /// Mappings from the topmost supertype down to `mapping` itself.
    fn chain(&self, mapping: &'a ManagedTypeMapping) -> Result<Vec<&'a ManagedTypeMapping>> {
        let mut chain = vec![mapping];
        let mut current = mapping;
        while let Some(superclass) = &current.superclass {
            current = self.mapping_of(self.type_id(superclass)?)?;
            chain.push(current);
        }
        chain.reverse();
        Ok(chain)
    }
}

/// Index of the first level of `chain` that belongs to its last mapping
/// rather than to the nearest entity ancestor: the mapped superclasses
/// between the two, then the mapping itself.
fn first_own_level(chain: &[&ManagedTypeMapping]) -> usize {
    let own = chain.len().saturating_sub(1);
    chain[..own]
        .iter()
        .rposition(|level| level.kind == ManagedTypeKindMapping::Entity)
        .map_or(0, |entity| entity + 1)
}

impl<'a> ModelResolver<'a> {

    fn finish_hierarchies(&mut self) -> Result<()> {
        for index in 0..self.hierarchies.len() {
            let hierarchy_id = HierarchyId(index);
            let root = self.hierarchies[index].root_entity;
            let root_mapping = self.mapping_of(root)?;
            let strategy = self.hierarchies[index].strategy;
            let entities = self.hierarchies[index].entities.clone();

            let version = version_descriptor(&self.managed_types[root.0])?;
            let natural_id = natural_id_descriptor(
                &self.managed_types[root.0],
                version.as_ref(),
                root_mapping.natural_id_mutable,
            )?;

            match self.discriminator_columns.get(&hierarchy_id).copied() {
                Some(_) if strategy == InheritanceStrategy::TablePerClass => {
                    return Err(OrmError::mapping(format!(
                        "Table-per-class hierarchy '{}' cannot declare a discriminator",
                        root_mapping.name
                    )));
                }
                Some((column, sql_type)) => {
                    let entries = entities
                        .iter()
                        .map(|id| {
                            let mapping = self.mapping_of(*id)?;
                            Ok(DiscriminatorEntry {
                                entity: *id,
                                entity_name: mapping.name.as_str(),
                                value: mapping.discriminator_value.as_deref(),
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    let (descriptor, assigned) = assemble_discriminator(column, sql_type, &entries)?;
                    for (entity, value) in assigned {
                        self.entity_details_mut(entity)?.discriminator_value = Some(value);
                    }
                    self.hierarchies[index].discriminator = Some(descriptor);
                }
                None if strategy == InheritanceStrategy::SingleTable && entities.len() > 1 => {
                    return Err(OrmError::mapping(format!(
                        "Single-table hierarchy '{}' has subclasses but no discriminator column",
                        root_mapping.name
                    )));
                }
                None => {}
            }

            if let Some(cache) = &root_mapping.cache {
                match self.regions {
                    Some(regions) => {
                        let region = cache.region.clone().unwrap_or_else(|| root_mapping.name.clone());
                        let access = regions.build_entity_access(&region, cache.access)?;
                        debug!("Hierarchy '{}' cached in region '{}'", root_mapping.name, region);
                        self.hierarchies[index].cache = Some(access);
                        for entity in &entities {
                            let details = self.entity_details_mut(*entity)?;
                            details.can_read_from_cache = true;
                            details.can_write_to_cache = true;
                        }
                    }
                    None => warn!(
                        "Entity '{}' is mapped as cached but no region factory was supplied",
                        root_mapping.name
                    ),
                }
            }

            let hierarchy = &mut self.hierarchies[index];
            hierarchy.version = version;
            hierarchy.natural_id = natural_id;
        }
        Ok(())
    }

    fn link_sub_types(&mut self) {
        let links: Vec<(ManagedTypeId, ManagedTypeId)> = self
            .managed_types
            .iter()
            .filter_map(|t| t.super_type.map(|parent| (parent, t.id)))
            .collect();
        for (parent, child) in links {
            self.managed_types[parent.0].sub_types.push(child);
        }
    }

    fn register_navigables(&self) -> HashMap<NavigableRole, NavigableRef> {
        let mut navigables = HashMap::new();
        for hierarchy in &self.hierarchies {
            navigables
                .entry(hierarchy.identifier.role().clone())
                .or_insert(NavigableRef::Identifier(hierarchy.id));
        }
        for descriptor in &self.managed_types {
            if matches!(descriptor.kind, ManagedTypeKind::MappedSuperclass { .. }) {
                continue;
            }
            navigables
                .entry(descriptor.role.clone())
                .or_insert(NavigableRef::ManagedType(descriptor.id));
            for attribute in descriptor.attributes() {
                navigables
                    .entry(attribute.role.clone())
                    .or_insert(NavigableRef::Attribute {
                        owner: descriptor.id,
                        position: attribute.position,
                    });
            }
        }
        for collection in &self.collections {
            navigables
                .entry(collection.role.clone())
                .or_insert(NavigableRef::Collection(collection.id));
        }
        navigables
    }
}
