use log::{debug, trace, warn};
use std::rc::Rc;
use std::sync::Arc;
use crate::cache::{CacheEntry, CacheKey, CacheMode, EntityDataAccess};
use crate::config::SessionConfig;
use crate::context::{EntityEntry, EntityKey, PersistenceContext};
use crate::core::{Result, Value};
use crate::event::{EventListenerRegistry, EventType, LoadEvent};
use crate::instance::{EntityInstance, ObjectValue, SavedInstance};
use crate::metamodel::{ManagedTypeId, RuntimeModel};
use super::LoadingEntityEntry;

/// An entity whose state is injected and whose listeners have run, waiting
/// to be registered in the persistence context.
pub(super) struct PreparedLoad {
    key: EntityKey,
    entity: ManagedTypeId,
    instance: EntityInstance,
    /// Contents of an instance the context already held, restored on rollback.
    saved: Option<SavedInstance>,
    snapshot: Rc<Vec<ObjectValue>>,
    version: Option<Value>,
    read_only: bool,
    natural_id: Option<(ManagedTypeId, Vec<Value>)>,
    cache_put: Option<CachePut>,
}

struct CachePut {
    access: Arc<dyn EntityDataAccess>,
    cache_key: CacheKey,
    entry: CacheEntry,
}

/// Second phase of loading one entity: fire PreLoad, inject the hydrated
/// state, take the snapshot, build the cache entry and fire PostLoad.
/// Nothing is written to the context; an instance the context already
/// holds is restored if a step fails.
pub(super) fn prepare_entity(
    entry: LoadingEntityEntry,
    model: &RuntimeModel,
    options: &SessionConfig,
    context: &dyn PersistenceContext,
    listeners: &EventListenerRegistry,
) -> Result<PreparedLoad> {
    let saved = context
        .get_entity(&entry.key)
        .filter(|existing| existing.ptr_eq(&entry.instance))
        .map(|existing| existing.save());
    let instance = entry.instance.clone();
    match load_state(entry, model, options, context, listeners) {
        Ok(mut load) => {
            load.saved = saved;
            Ok(load)
        }
        Err(err) => {
            if let Some(saved) = saved {
                instance.restore(saved);
            }
            Err(err)
        }
    }
}

fn load_state(
    entry: LoadingEntityEntry,
    model: &RuntimeModel,
    options: &SessionConfig,
    context: &dyn PersistenceContext,
    listeners: &EventListenerRegistry,
) -> Result<PreparedLoad> {
    let LoadingEntityEntry {
        key,
        entity,
        instance,
        state,
    } = entry;
    let descriptor = model.managed_type(entity);
    let hierarchy = model.hierarchy_of(entity)?;

    let state = Rc::new(state.unwrap_or_else(|| {
        warn!("Entity {} reached finish_up without state; loading nulls", key);
        vec![ObjectValue::Null; descriptor.state_array_size()]
    }));

    let mut load_event = LoadEvent {
        event_type: EventType::PreLoad,
        entity_name: descriptor.name.clone(),
        key: key.clone(),
        instance: instance.clone(),
        state: Rc::clone(&state),
    };
    listeners.fire(&load_event)?;

    hierarchy.identifier.inject(
        &instance,
        descriptor,
        key.identifier(),
        model.identifier_embeddable(hierarchy.id),
    )?;
    descriptor.representation.inject_state(&instance, descriptor, &state);

    let read_only = options.default_read_only || context.is_default_read_only() || !hierarchy.mutable;
    let snapshot = if read_only {
        Rc::clone(&state)
    } else {
        Rc::new(state.iter().map(ObjectValue::deep_copy).collect())
    };

    let version = hierarchy
        .version
        .as_ref()
        .and_then(|version| state.get(version.position))
        .and_then(ObjectValue::as_basic)
        .cloned();

    let natural_id = hierarchy.natural_id.as_ref().map(|natural_id| {
        let values = natural_id
            .positions()
            .into_iter()
            .map(|position| {
                state
                    .get(position)
                    .and_then(ObjectValue::as_basic)
                    .cloned()
                    .unwrap_or(Value::Null)
            })
            .collect();
        (hierarchy.root_entity, values)
    });

    let cache_put = match &hierarchy.cache {
        Some(access) if options.cache_mode.is_put_enabled() && descriptor.expect_entity()?.can_write_to_cache => {
            let root_name = &model.managed_type(hierarchy.root_entity).name;
            let cache_key =
                access.generate_cache_key(key.identifier(), root_name, options.tenant_identifier.as_deref());
            let entry = if model.config().use_structured_cache_entries {
                CacheEntry::structured(descriptor, &state, version.clone())?
            } else {
                CacheEntry::standard(descriptor, &state, version.clone())?
            };
            Some(CachePut {
                access: Arc::clone(access),
                cache_key,
                entry,
            })
        }
        _ => None,
    };

    load_event.event_type = EventType::PostLoad;
    listeners.fire(&load_event)?;
    instance.mark_initialized();

    Ok(PreparedLoad {
        key,
        entity,
        instance,
        saved: None,
        snapshot,
        version,
        read_only,
        natural_id,
        cache_put,
    })
}

/// Write every prepared entity's disassembled state to its cache region.
pub(super) fn put_in_cache(
    prepared: &[PreparedLoad],
    options: &SessionConfig,
    context: &dyn PersistenceContext,
) -> Result<()> {
    for load in prepared {
        let Some(put) = &load.cache_put else {
            continue;
        };
        let stored = if context.was_inserted_during_transaction(&load.key) {
            put.access.update(put.cache_key.clone(), put.entry.clone(), load.version.as_ref())?
        } else {
            let minimal_put = options.minimal_puts && options.cache_mode != CacheMode::Refresh;
            put.access
                .put_from_load(put.cache_key.clone(), put.entry.clone(), load.version.as_ref(), minimal_put)?
        };
        debug!("Cache put for {} in region {}: stored={}", load.key, put.access.region_name(), stored);
    }
    Ok(())
}

/// Register a prepared entity: instance, entry with its snapshot, proxy
/// binding and natural-id resolution.
pub(super) fn register_entity(load: PreparedLoad, context: &mut dyn PersistenceContext) {
    let PreparedLoad {
        key,
        entity,
        instance,
        snapshot,
        version,
        read_only,
        natural_id,
        ..
    } = load;

    context.add_entity(key.clone(), instance.clone());
    context.add_entry(EntityEntry::loading(key.clone(), entity));
    if let Some(entry) = context.get_entry_mut(&key) {
        entry.post_load(snapshot, version, read_only);
    }

    if let Some(proxy) = context.get_proxy(&key) {
        trace!("Binding proxy {} to its loaded instance", key);
        proxy.set_implementation(instance);
    }
    if let Some((root, values)) = natural_id {
        context.cache_natural_id_resolution(root, values, key.identifier().clone());
    }
    context.batch_fetch_queue().remove_batch_loadable_entity_key(&key);
    debug!("Loaded {} ({})", key, if read_only { "read-only" } else { "managed" });
}

/// Give instances the context already held their contents from before the load.
pub(super) fn roll_back(prepared: Vec<PreparedLoad>) {
    for load in prepared.into_iter().rev() {
        if let Some(saved) = load.saved {
            trace!("Restoring {} after a failed load", load.key);
            load.instance.restore(saved);
        }
    }
}
