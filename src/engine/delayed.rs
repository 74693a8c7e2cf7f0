use log::trace;
use crate::context::{CollectionKey, EntityKey};
use crate::core::{Result, Value};
use crate::instance::{EntityProxy, ObjectValue, PersistentCollection};
use crate::metamodel::ManagedTypeId;
use crate::shape::{DelayedCollectionFetch, FrameId};
use super::RowProcessingState;

impl RowProcessingState<'_> {
    /// Reference to a to-one target that is not loaded by this row.
    ///
    /// Resolution order: an entity loading in this traversal, a managed
    /// entity, an existing proxy, a reference already handed out by this
    /// traversal. Failing those, a target enhanced for lazy loading gets an
    /// uninitialized instance carrying its identifier; any other target gets
    /// a proxy. Both are staged for the persistence context so later
    /// references share identity.
    pub(crate) fn resolve_delayed_entity(&mut self, target: ManagedTypeId, parts: Vec<Value>) -> Result<ObjectValue> {
        let model = self.model;
        let hierarchy = model.hierarchy_of(target)?;
        let Some(identifier) = hierarchy.identifier.assemble(parts) else {
            return Ok(ObjectValue::Null);
        };
        let descriptor = model.managed_type(target);
        let details = descriptor.expect_entity()?;
        let key = EntityKey::new(identifier, hierarchy.root_entity, target, &descriptor.name);

        if let Some(loading) = self.processing.loading_entity(&key) {
            return Ok(ObjectValue::Entity(loading.instance.clone()));
        }
        if let Some(instance) = self.context.get_entity(&key) {
            return Ok(ObjectValue::Entity(instance));
        }
        if let Some(proxy) = self.context.get_proxy(&key) {
            return Ok(ObjectValue::Proxy(proxy));
        }
        if let Some(staged) = self.processing.delayed_entity(&key) {
            return Ok(staged.clone());
        }

        let value = if details.enhanced_for_lazy_loading {
            let instance = descriptor.representation.instantiate(descriptor);
            hierarchy.identifier.inject(
                &instance,
                descriptor,
                key.identifier(),
                model.identifier_embeddable(hierarchy.id),
            )?;
            ObjectValue::Entity(instance)
        } else {
            ObjectValue::Proxy(EntityProxy::new(&descriptor.name, key.clone()))
        };
        trace!("Delayed reference to {} as {}", key, value.kind_name());

        self.processing
            .stage_delayed_entity(key, value.clone(), details.is_batch_loadable());
        Ok(value)
    }

    /// Uninitialized wrapper for a collection not fetched by this query.
    pub(crate) fn resolve_delayed_collection(
        &mut self,
        fetch: &DelayedCollectionFetch,
        owner: FrameId,
    ) -> Result<ObjectValue> {
        let Some(owner_key) = self.frame(owner)?.key.clone() else {
            return Ok(ObjectValue::Null);
        };
        let descriptor = self.model.collection(fetch.collection);
        let key = CollectionKey::new(fetch.collection, owner_key.identifier().clone());

        if let Some(existing) = self.context.get_collection(&key) {
            return Ok(ObjectValue::Collection(existing));
        }
        if let Some(loading) = self.processing.loading_collection(&key) {
            return Ok(ObjectValue::Collection(loading.collection.clone()));
        }
        if let Some(staged) = self.processing.delayed_collection(&key) {
            return Ok(ObjectValue::Collection(staged.clone()));
        }

        let wrapper = PersistentCollection::new(
            descriptor.role.clone(),
            fetch.collection,
            descriptor.classification,
            Some(key.owner_key.clone()),
        );
        self.processing
            .stage_delayed_collection(key, wrapper.clone(), descriptor.is_batch_loadable());
        Ok(ObjectValue::Collection(wrapper))
    }
}
