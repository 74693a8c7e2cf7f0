use std::collections::HashMap;
use crate::boot::BootModel;
use crate::cache::RegionFactory;
use crate::config::ModelConfig;
use crate::core::{OrmError, Result};
use crate::hierarchy::{EntityHierarchy, HierarchyId};
use crate::relational::RelationalModel;
use super::resolve::ModelResolver;
use super::{
    CollectionId, ManagedTypeDescriptor, ManagedTypeId, NavigableRole, PersistentAttribute,
    PersistentCollectionDescriptor,
};

/// What a navigable role points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigableRef {
    ManagedType(ManagedTypeId),
    Attribute { owner: ManagedTypeId, position: usize },
    Identifier(HierarchyId),
    Collection(CollectionId),
}

/// Fully resolved runtime model. Descriptors live in arenas and refer to
/// each other by id; the model is immutable once built.
#[derive(Debug)]
pub struct RuntimeModel {
    pub(crate) relational: RelationalModel,
    pub(crate) managed_types: Vec<ManagedTypeDescriptor>,
    pub(crate) entities_by_name: HashMap<String, ManagedTypeId>,
    pub(crate) hierarchies: Vec<EntityHierarchy>,
    pub(crate) collections: Vec<PersistentCollectionDescriptor>,
    pub(crate) navigables: HashMap<NavigableRole, NavigableRef>,
    pub(crate) config: ModelConfig,
}

impl RuntimeModel {
    /// Build the runtime model without a second-level cache.
    pub fn build(boot: &BootModel, config: ModelConfig) -> Result<Self> {
        ModelResolver::new(boot, config, None).resolve()
    }

    /// Build the runtime model, creating cache regions for cached hierarchies.
    pub fn build_with_cache(
        boot: &BootModel,
        config: ModelConfig,
        regions: &dyn RegionFactory,
    ) -> Result<Self> {
        ModelResolver::new(boot, config, Some(regions)).resolve()
    }

    pub fn relational(&self) -> &RelationalModel {
        &self.relational
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn managed_type(&self, id: ManagedTypeId) -> &ManagedTypeDescriptor {
        &self.managed_types[id.0]
    }

    pub fn managed_types(&self) -> &[ManagedTypeDescriptor] {
        &self.managed_types
    }

    pub fn find_entity(&self, name: &str) -> Option<ManagedTypeId> {
        self.entities_by_name.get(name).copied()
    }

    /// Entity descriptor by entity name or JPA name.
    pub fn entity(&self, name: &str) -> Result<&ManagedTypeDescriptor> {
        self.find_entity(name)
            .map(|id| self.managed_type(id))
            .ok_or_else(|| OrmError::mapping(format!("Unknown entity '{}'", name)))
    }

    pub fn entities(&self) -> impl Iterator<Item = &ManagedTypeDescriptor> {
        self.managed_types.iter().filter(|t| t.is_entity())
    }

    pub fn hierarchy(&self, id: HierarchyId) -> &EntityHierarchy {
        &self.hierarchies[id.0]
    }

    pub fn hierarchies(&self) -> &[EntityHierarchy] {
        &self.hierarchies
    }

    pub fn hierarchy_of(&self, entity: ManagedTypeId) -> Result<&EntityHierarchy> {
        let details = self.managed_type(entity).expect_entity()?;
        Ok(self.hierarchy(details.hierarchy))
    }

    pub fn root_entity(&self, entity: ManagedTypeId) -> Result<ManagedTypeId> {
        Ok(self.hierarchy_of(entity)?.root_entity)
    }

    pub fn collection(&self, id: CollectionId) -> &PersistentCollectionDescriptor {
        &self.collections[id.0]
    }

    pub fn collections(&self) -> &[PersistentCollectionDescriptor] {
        &self.collections
    }

    pub fn navigable(&self, role: &NavigableRole) -> Option<NavigableRef> {
        self.navigables.get(role).copied()
    }

    pub fn navigable_roles(&self) -> impl Iterator<Item = &NavigableRole> {
        self.navigables.keys()
    }

    /// Attribute registered under `role`.
    pub fn attribute_by_role(&self, role: &NavigableRole) -> Option<&PersistentAttribute> {
        match self.navigable(role)? {
            NavigableRef::Attribute { owner, position } => {
                self.managed_type(owner).attributes().get(position)
            }
            _ => None,
        }
    }

    pub fn is_subtype_of(&self, sub: ManagedTypeId, sup: ManagedTypeId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == sup {
                return true;
            }
            current = self.managed_type(id).super_type;
        }
        false
    }

    /// `entity` followed by all of its entity subtypes, parents before children.
    pub fn subtype_closure(&self, entity: ManagedTypeId) -> Vec<ManagedTypeId> {
        let mut closure = vec![entity];
        let mut cursor = 0;
        while cursor < closure.len() {
            let current = closure[cursor];
            closure.extend(
                self.managed_type(current)
                    .sub_types
                    .iter()
                    .copied()
                    .filter(|id| self.managed_type(*id).is_entity()),
            );
            cursor += 1;
        }
        closure
    }

    /// Entity subtypes that polymorphic loading of `entity` may produce.
    pub fn polymorphic_closure(&self, entity: ManagedTypeId) -> Result<Vec<ManagedTypeId>> {
        if self.hierarchy_of(entity)?.is_polymorphic() {
            Ok(self.subtype_closure(entity))
        } else {
            Ok(vec![entity])
        }
    }

    /// Embeddable descriptor of a composite identifier, if any.
    pub fn identifier_embeddable(&self, hierarchy: HierarchyId) -> Option<&ManagedTypeDescriptor> {
        self.hierarchy(hierarchy)
            .identifier
            .embeddable()
            .map(|id| self.managed_type(id))
    }
}
