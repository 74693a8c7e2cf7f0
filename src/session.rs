//! Load session: the runtime model, a persistence context, listeners and
//! options for executing result sets into managed entities.

use log::debug;
use std::sync::Arc;
use tracing::{Level, event, info_span};
use crate::cache::CacheEntry;
use crate::config::SessionConfig;
use crate::context::{EntityKey, PersistenceContext, StatefulPersistenceContext};
use crate::core::{Identifier, Result};
use crate::engine::{ResultsConsumer, RowProcessingState, RowReader};
use crate::event::EventListenerRegistry;
use crate::instance::{EntityInstance, ObjectValue};
use crate::metamodel::RuntimeModel;
use crate::processing::ProcessingState;
use crate::result::ResultSetCursor;
use crate::shape::{QueryShape, ShapeBuilder, SqlSelectionCollector};

/// One unit of work against a shared runtime model.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use rustmemorm::{
///     AttributeMapping, BootModel, LoadSession, ManagedTypeMapping, ModelConfig, QueryResult,
///     RuntimeModel, SessionConfig, SqlType, Value,
/// };
///
/// # fn main() -> rustmemorm::Result<()> {
/// let boot = BootModel::new().with_type(
///     ManagedTypeMapping::entity("Point")
///         .table("point")
///         .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
///         .attribute(AttributeMapping::basic("x", "x", SqlType::Integer)),
/// );
/// let model = Arc::new(RuntimeModel::build(&boot, ModelConfig::default())?);
/// let mut session = LoadSession::new(model, SessionConfig::default());
///
/// let (shape, labels) = session.shape_for("Point", "p")?;
/// let result = QueryResult::new(labels, vec![vec![Value::Integer(1), Value::Integer(3)]]);
/// let rows = session.execute(&shape, &mut result.cursor())?;
///
/// let point = rows[0][0].as_entity().unwrap();
/// assert_eq!(point.get_value("x"), Value::Integer(3));
/// # Ok(())
/// # }
/// ```
pub struct LoadSession {
    model: Arc<RuntimeModel>,
    config: SessionConfig,
    context: StatefulPersistenceContext,
    listeners: EventListenerRegistry,
}

impl LoadSession {
    pub fn new(model: Arc<RuntimeModel>, config: SessionConfig) -> Self {
        let context = StatefulPersistenceContext::new().with_default_read_only(config.default_read_only);
        Self {
            model,
            config,
            context,
            listeners: EventListenerRegistry::new(),
        }
    }

    pub fn model(&self) -> &RuntimeModel {
        &self.model
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn listeners_mut(&mut self) -> &mut EventListenerRegistry {
        &mut self.listeners
    }

    pub fn context(&self) -> &StatefulPersistenceContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut StatefulPersistenceContext {
        &mut self.context
    }

    /// Shape selecting `entity_name` under `alias`, with the column labels
    /// (`alias.column`) in selection order.
    pub fn shape_for(&self, entity_name: &str, alias: &str) -> Result<(QueryShape, Vec<String>)> {
        let mut collector = SqlSelectionCollector::new();
        let shape = {
            let mut builder = ShapeBuilder::new(&self.model, &mut collector);
            builder.add_entity_result(entity_name, alias)?;
            builder.build()
        };
        Ok((shape, collector.labels().to_vec()))
    }

    /// Walk `cursor` through `shape`, returning one value per domain result
    /// for every row. Any failure aborts the traversal; nothing it loaded is
    /// registered as managed.
    pub fn execute(&mut self, shape: &QueryShape, cursor: &mut dyn ResultSetCursor) -> Result<Vec<Vec<ObjectValue>>> {
        let span = info_span!("execute", results = shape.results().len(), columns = cursor.column_count());
        let _enter = span.enter();

        let mut processing = ProcessingState::new();
        let mut consumer = ResultsConsumer::new(self.config.unique_results);
        let mut row_count = 0usize;
        {
            let mut state = RowProcessingState::new(
                &self.model,
                &self.config,
                &mut self.context,
                &mut processing,
                shape,
            );
            let reader = RowReader::new(shape);
            while let Some(row) = cursor.next_row()? {
                consumer.consume(reader.read_row(&mut state, row)?);
                row_count += 1;
            }
        }

        let loaded = processing.loading_entity_count();
        processing.finish_up(&self.model, &self.config, &mut self.context, &self.listeners)?;

        let results = consumer.finish();
        event!(Level::INFO, rows = row_count, loaded, results = results.len(), "Result set processed");
        Ok(results)
    }

    /// Managed instance of `entity_name` with the given identifier.
    pub fn find(&self, entity_name: &str, identifier: Identifier) -> Result<Option<EntityInstance>> {
        let key = self.entity_key(entity_name, identifier)?;
        Ok(self.context.get_entity(&key))
    }

    /// Second-level cache entry of an entity, if its hierarchy is cached.
    pub fn cached_state(&self, entity_name: &str, identifier: Identifier) -> Result<Option<CacheEntry>> {
        let descriptor = self.model.entity(entity_name)?;
        let hierarchy = self.model.hierarchy_of(descriptor.id)?;
        let Some(cache) = &hierarchy.cache else {
            return Ok(None);
        };
        if !self.config.cache_mode.is_get_enabled() || !descriptor.expect_entity()?.can_read_from_cache {
            return Ok(None);
        }
        let root_name = &self.model.managed_type(hierarchy.root_entity).name;
        let key = cache.generate_cache_key(&identifier, root_name, self.config.tenant_identifier.as_deref());
        cache.get(&key)
    }

    pub fn entity_key(&self, entity_name: &str, identifier: Identifier) -> Result<EntityKey> {
        let descriptor = self.model.entity(entity_name)?;
        let hierarchy = self.model.hierarchy_of(descriptor.id)?;
        Ok(EntityKey::new(identifier, hierarchy.root_entity, descriptor.id, &descriptor.name))
    }

    /// Evict every managed object from the session.
    pub fn clear(&mut self) {
        debug!("Clearing load session");
        self.context.clear();
    }
}
