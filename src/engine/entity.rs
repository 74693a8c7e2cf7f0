use log::trace;
use crate::context::EntityKey;
use crate::core::{OrmError, Result};
use crate::hierarchy::EntityHierarchy;
use crate::instance::ObjectValue;
use crate::metamodel::ManagedTypeId;
use crate::shape::{EntityShape, Fetch};
use super::{FrameState, RowProcessingState};

impl RowProcessingState<'_> {
    /// First phase: resolve the key of `shape` and of every entity joined
    /// below it, top-down, before any state is assembled. Bidirectional
    /// fetches rely on their referenced frame being resolved here.
    pub(crate) fn resolve_keys(&mut self, shape: &EntityShape) -> Result<()> {
        self.resolve_entity_key(shape)?;
        let frame = self.frame(shape.frame)?;
        if !frame.state.is_resolved() {
            return Ok(());
        }
        let concrete = frame.concrete.unwrap_or(shape.entity);

        for fetch in &shape.fetches {
            self.resolve_fetch_keys(fetch)?;
        }
        for (subtype, level) in &shape.subtype_fetches {
            if self.model.is_subtype_of(concrete, *subtype) {
                for fetch in level {
                    self.resolve_fetch_keys(fetch)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_fetch_keys(&mut self, fetch: &Fetch) -> Result<()> {
        match fetch {
            Fetch::Composite(composite) => {
                for nested in &composite.fetches {
                    self.resolve_fetch_keys(nested)?;
                }
                Ok(())
            }
            Fetch::Entity(entity) => self.resolve_keys(&entity.entity),
            Fetch::Plural(plural) => {
                if let Some(index) = &plural.index {
                    self.resolve_fetch_keys(index)?;
                }
                self.resolve_fetch_keys(&plural.element)
            }
            _ => Ok(()),
        }
    }

    fn resolve_entity_key(&mut self, shape: &EntityShape) -> Result<()> {
        if self.frame(shape.frame)?.state != FrameState::Unstarted {
            return Ok(());
        }
        let model = self.model;
        let hierarchy = model.hierarchy_of(shape.entity)?;

        let parts = self.read_all(&shape.identifier)?;
        let Some(identifier) = hierarchy.identifier.assemble(parts) else {
            self.frame_mut(shape.frame)?.state = FrameState::Missing;
            return Ok(());
        };

        let concrete = self.concrete_type(shape, hierarchy)?;
        self.check_tenant(shape)?;

        let descriptor = model.managed_type(concrete);
        let key = EntityKey::new(identifier, hierarchy.root_entity, concrete, &descriptor.name);

        let (state, concrete, instance) = if let Some(loading) = self.processing.loading_entity(&key) {
            (FrameState::Loading, loading.entity, loading.instance.clone())
        } else if let Some(existing) = self.context.get_entity(&key)
            && existing.is_initialized()
            && !self.options.refresh
        {
            (FrameState::FoundInContext, concrete, existing)
        } else {
            // An uninitialized instance handed out earlier is initialized in place.
            let instance = self
                .context
                .get_entity(&key)
                .or_else(|| self.processing.staged_instance(&key))
                .unwrap_or_else(|| descriptor.representation.instantiate(descriptor));
            self.processing
                .register_loading_entity(key.clone(), concrete, instance.clone());
            (FrameState::ResolvedNew, concrete, instance)
        };

        self.processing.note_resolved(&key);
        trace!("Frame {} resolved {} as {}", shape.frame, key, state);

        let frame = self.frame_mut(shape.frame)?;
        frame.state = state;
        frame.key = Some(key);
        frame.concrete = Some(concrete);
        frame.instance = Some(instance);
        Ok(())
    }

    /// Concrete type of the row: from the discriminator when the hierarchy
    /// has one, otherwise the deepest joined subclass whose key is present.
    fn concrete_type(&self, shape: &EntityShape, hierarchy: &EntityHierarchy) -> Result<ManagedTypeId> {
        let model = self.model;
        if let (Some(selection), Some(discriminator)) = (&shape.discriminator, &hierarchy.discriminator) {
            let raw = self.read(selection)?;
            return discriminator
                .resolve(&raw)
                .filter(|concrete| model.is_subtype_of(*concrete, shape.entity))
                .ok_or_else(|| OrmError::WrongClass {
                    entity: model.managed_type(shape.entity).name.clone(),
                    value: raw.to_string(),
                });
        }

        let mut concrete = shape.entity;
        for (subtype, selection) in &shape.subclass_keys {
            if !self.read(selection)?.is_null() {
                concrete = *subtype;
            }
        }
        Ok(concrete)
    }

    fn check_tenant(&self, shape: &EntityShape) -> Result<()> {
        let (Some(selection), Some(expected)) = (&shape.tenant, &self.options.tenant_identifier) else {
            return Ok(());
        };
        let raw = self.read(selection)?;
        let actual = raw.as_str().map(str::to_string).unwrap_or_else(|| raw.to_string());
        if &actual != expected {
            return Err(OrmError::ExecutionError(format!(
                "Row of '{}' belongs to tenant {} but the session is bound to '{}'",
                shape.path, raw, expected
            )));
        }
        Ok(())
    }

    /// Second phase: assemble the state array of the frame's concrete type.
    /// Only the frame that instantiated the entity keeps the state; adopted
    /// and already-managed frames are walked for their collections only.
    pub(crate) fn assemble_entity(&mut self, shape: &EntityShape) -> Result<ObjectValue> {
        let frame = self.frame(shape.frame)?;
        if !frame.state.is_resolved() || frame.assembled {
            return Ok(frame.value());
        }
        let state = frame.state;
        let key = frame.key.clone();
        let concrete = frame.concrete.unwrap_or(shape.entity);
        self.frame_mut(shape.frame)?.assembled = true;

        let model = self.model;
        let mut values = vec![ObjectValue::Null; model.managed_type(concrete).state_array_size()];
        for fetch in &shape.fetches {
            let value = self.assemble_fetch(fetch, shape.frame)?;
            if let Some(slot) = values.get_mut(fetch.position()) {
                *slot = value;
            }
        }
        for (subtype, level) in &shape.subtype_fetches {
            if !model.is_subtype_of(concrete, *subtype) {
                continue;
            }
            for fetch in level {
                let value = self.assemble_fetch(fetch, shape.frame)?;
                if let Some(slot) = values.get_mut(fetch.position()) {
                    *slot = value;
                }
            }
        }

        if state == FrameState::ResolvedNew
            && let Some(key) = &key
            && let Some(entry) = self.processing.loading_entity_mut(key)
            && entry.state.is_none()
        {
            entry.state = Some(values);
        }
        Ok(self.frame(shape.frame)?.value())
    }
}
