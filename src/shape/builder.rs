use log::debug;
use crate::core::{OrmError, Result};
use crate::hierarchy::InheritanceStrategy;
use crate::metamodel::{
    AttributeKind, BasicValueConverter, FetchTiming, CollectionClassification, CollectionElement, CollectionIndex,
    ManagedTypeId, NavigableRole, NotFoundAction, PersistentAttribute, PluralAttribute, RuntimeModel,
    ToOneAttribute, ToOneKey,
};
use crate::relational::{ColumnId, TableKind};
use super::{
    BasicFetch, CircularFetch, CircularKind, CompositeFetch, DelayedCollectionFetch, DelayedEntityFetch,
    DomainResult, EntityFetch, EntityShape, Fetch, FrameId, NavigablePath, PluralFetch, QueryShape,
    SqlExpressionResolver, SqlSelection, TableGroup,
};

/// How the entity whose attributes are being fetched was reached.
#[derive(Debug, Clone)]
enum Link {
    Root,
    ToOne {
        owner_frame: FrameId,
        owner_entity: ManagedTypeId,
        attribute_name: String,
        mapped_by: Option<String>,
    },
    Element {
        owner_frame: FrameId,
        mapped_by: Option<String>,
    },
}

/// Fetch parent context: the entity frame, its tables and alias prefix.
#[derive(Debug, Clone)]
struct Scope {
    path: NavigablePath,
    entity: ManagedTypeId,
    frame: FrameId,
    tables: TableGroup,
    prefix: String,
    depth: usize,
    link: Link,
    /// Inside an embeddable rather than directly on the entity.
    embedded: bool,
}

/// Builds the result-shape tree of one query against the runtime model.
///
/// Table aliases: the caller names the root alias; additional tables of an
/// entity are `{alias}_{i}`; joined fetches are `{parent}_{attribute}`; an
/// entity element read through a collection table is `{collection}_element`.
pub struct ShapeBuilder<'m, 'r> {
    model: &'m RuntimeModel,
    resolver: &'r mut dyn SqlExpressionResolver,
    results: Vec<DomainResult>,
    entity_frames: usize,
    collection_frames: usize,
    joined_bags: Vec<NavigableRole>,
}

impl<'m, 'r> ShapeBuilder<'m, 'r> {
    pub fn new(model: &'m RuntimeModel, resolver: &'r mut dyn SqlExpressionResolver) -> Self {
        Self {
            model,
            resolver,
            results: Vec::new(),
            entity_frames: 0,
            collection_frames: 0,
            joined_bags: Vec::new(),
        }
    }

    /// Select an entity, with its eager associations joined.
    pub fn add_entity_result(&mut self, entity_name: &str, alias: &str) -> Result<&mut Self> {
        let entity = self.model.entity(entity_name)?.id;
        let mut ancestry = Vec::new();
        let shape = self.entity_shape(
            entity,
            NavigablePath::root(entity_name),
            alias.to_string(),
            0,
            Link::Root,
            &mut ancestry,
        )?;
        self.results.push(DomainResult::Entity(shape));
        Ok(self)
    }

    /// Select a single column as a scalar result.
    pub fn add_scalar_result(
        &mut self,
        alias: &str,
        table: &str,
        column: &str,
        converter: Option<BasicValueConverter>,
    ) -> Result<&mut Self> {
        let relational = self.model.relational();
        let table = relational.get_table(table)?;
        let column_id = relational
            .find_column(table.id, column)
            .ok_or_else(|| OrmError::mapping(format!("Column '{}.{}' not found", table.name, column)))?;
        let selection = self.resolver.resolve_sql_selection(alias, column_id, relational);
        self.results.push(DomainResult::Basic(BasicFetch {
            path: NavigablePath::root(&format!("{}.{}", alias, column)),
            position: 0,
            selection,
            converter,
        }));
        Ok(self)
    }

    pub fn build(&mut self) -> QueryShape {
        debug!(
            "Built result shape: {} results, {} entity frames, {} collection frames",
            self.results.len(),
            self.entity_frames,
            self.collection_frames
        );
        QueryShape::new(
            std::mem::take(&mut self.results),
            self.entity_frames,
            self.collection_frames,
        )
    }

    fn next_entity_frame(&mut self) -> FrameId {
        self.entity_frames += 1;
        self.entity_frames - 1
    }

    fn next_collection_frame(&mut self) -> FrameId {
        self.collection_frames += 1;
        self.collection_frames - 1
    }

    fn select(&mut self, tables: &TableGroup, column: ColumnId) -> Result<SqlSelection> {
        let relational = self.model.relational();
        let table = relational.column(column).table;
        let alias = tables.alias_of(table).ok_or_else(|| {
            OrmError::mapping(format!(
                "Column '{}' is not reachable from the fetch's tables",
                relational.qualified_name(column)
            ))
        })?;
        Ok(self.resolver.resolve_sql_selection(alias, column, relational))
    }

    fn select_all(&mut self, tables: &TableGroup, columns: &[ColumnId]) -> Result<Vec<SqlSelection>> {
        columns.iter().map(|column| self.select(tables, *column)).collect()
    }

    fn entity_shape(
        &mut self,
        entity: ManagedTypeId,
        path: NavigablePath,
        alias: String,
        depth: usize,
        link: Link,
        ancestry: &mut Vec<NavigableRole>,
    ) -> Result<EntityShape> {
        let model = self.model;
        let frame = self.next_entity_frame();
        let closure = model.polymorphic_closure(entity)?;
        let hierarchy = model.hierarchy_of(entity)?;

        let mut tables = TableGroup::new();
        for member in &closure {
            for binding in &model.managed_type(*member).expect_entity()?.tables {
                let table_alias = match tables.aliases().count() {
                    0 => alias.clone(),
                    n => format!("{}_{}", alias, n),
                };
                tables.add(binding.table, table_alias);
            }
        }

        let details = model.managed_type(entity).expect_entity()?;
        let identifier = self.select_all(&tables, &details.identifier_columns)?;
        let discriminator = match &hierarchy.discriminator {
            Some(discriminator) => Some(self.select(&tables, discriminator.column)?),
            None => None,
        };
        let tenant = match &hierarchy.tenant {
            Some(tenant) => Some(self.select(&tables, tenant.column)?),
            None => None,
        };

        let mut subclass_keys = Vec::new();
        for member in closure.iter().skip(1) {
            let own = model
                .managed_type(*member)
                .expect_entity()?
                .tables
                .iter()
                .find(|binding| {
                    binding.contributor == *member
                        && match model.relational().table(binding.table).kind {
                            TableKind::JoinedSubclass => true,
                            TableKind::Primary => hierarchy.strategy == InheritanceStrategy::TablePerClass,
                            _ => false,
                        }
                });
            if let Some(binding) = own
                && let Some(first) = binding.key_columns.first()
            {
                subclass_keys.push((*member, self.select(&tables, *first)?));
            }
        }

        let scope = Scope {
            path: path.clone(),
            entity,
            frame,
            tables: tables.clone(),
            prefix: alias,
            depth,
            link,
            embedded: false,
        };

        let mut fetches = Vec::new();
        for attribute in model.managed_type(entity).attributes() {
            fetches.push(self.attribute_fetch(attribute, &scope, ancestry)?);
        }

        let mut subtype_fetches = Vec::new();
        for member in closure.iter().skip(1) {
            let descriptor = model.managed_type(*member);
            let inherited = descriptor
                .super_type
                .map_or(0, |parent| model.managed_type(parent).state_array_size());
            let mut level = Vec::new();
            for attribute in descriptor.attributes().iter().skip(inherited) {
                level.push(self.attribute_fetch(attribute, &scope, ancestry)?);
            }
            subtype_fetches.push((*member, level));
        }

        Ok(EntityShape {
            path,
            entity,
            frame,
            tables,
            identifier,
            discriminator,
            subclass_keys,
            tenant,
            fetches,
            subtype_fetches,
        })
    }

    fn attribute_fetch(
        &mut self,
        attribute: &'m PersistentAttribute,
        scope: &Scope,
        ancestry: &mut Vec<NavigableRole>,
    ) -> Result<Fetch> {
        let path = scope.path.append(&attribute.name);
        match &attribute.kind {
            AttributeKind::Basic(basic) => Ok(Fetch::Basic(BasicFetch {
                path,
                position: attribute.position,
                selection: self.select(&scope.tables, basic.column)?,
                converter: basic.converter.clone(),
            })),
            AttributeKind::Embedded(embedded) => {
                let nested = Scope {
                    path: path.clone(),
                    prefix: format!("{}_{}", scope.prefix, attribute.name),
                    embedded: true,
                    ..scope.clone()
                };
                let mut fetches = Vec::new();
                for part in self.model.managed_type(embedded.embeddable).attributes() {
                    fetches.push(self.attribute_fetch(part, &nested, ancestry)?);
                }
                Ok(Fetch::Composite(CompositeFetch {
                    path,
                    position: attribute.position,
                    embeddable: embedded.embeddable,
                    fetches,
                }))
            }
            AttributeKind::ToOne(to_one) => self.to_one_fetch(attribute, to_one, path, scope, ancestry),
            AttributeKind::Plural(plural) => self.plural_fetch(attribute, plural, path, scope, ancestry),
        }
    }

    /// Frame of the entity this to-one points back to, when it is the other
    /// side of the association that led to the current entity.
    fn bidirectional_frame(&self, attribute: &PersistentAttribute, to_one: &ToOneAttribute, scope: &Scope) -> Option<FrameId> {
        if scope.embedded {
            return None;
        }
        match &scope.link {
            Link::Root => None,
            Link::ToOne {
                owner_frame,
                owner_entity,
                attribute_name,
                mapped_by,
            } => {
                let inverse_of_parent = mapped_by.as_deref() == Some(attribute.name.as_str());
                let parent_is_owner = to_one.mapped_by.as_deref() == Some(attribute_name.as_str())
                    && (self.model.is_subtype_of(*owner_entity, to_one.target)
                        || self.model.is_subtype_of(to_one.target, *owner_entity));
                (inverse_of_parent || parent_is_owner).then_some(*owner_frame)
            }
            Link::Element { owner_frame, mapped_by } => {
                (mapped_by.as_deref() == Some(attribute.name.as_str())).then_some(*owner_frame)
            }
        }
    }

    fn to_one_fetch(
        &mut self,
        attribute: &'m PersistentAttribute,
        to_one: &'m ToOneAttribute,
        path: NavigablePath,
        scope: &Scope,
        ancestry: &mut Vec<NavigableRole>,
    ) -> Result<Fetch> {
        if let Some(referenced) = self.bidirectional_frame(attribute, to_one, scope) {
            return Ok(Fetch::Circular(CircularFetch {
                path,
                position: attribute.position,
                kind: CircularKind::Bidirectional,
                target: to_one.target,
                referenced_frame: Some(referenced),
                key: Vec::new(),
            }));
        }

        if ancestry.contains(&attribute.role) {
            return match &to_one.key {
                ToOneKey::Referring { columns, .. } => Ok(Fetch::Circular(CircularFetch {
                    path,
                    position: attribute.position,
                    kind: CircularKind::SelfReferencing,
                    target: to_one.target,
                    referenced_frame: None,
                    key: self.select_all(&scope.tables, columns)?,
                })),
                ToOneKey::Target { .. } => Err(OrmError::UnsupportedOperation(format!(
                    "Circular fetch of inverse association '{}'",
                    attribute.role
                ))),
                ToOneKey::Pending => Err(OrmError::UnresolvedReference(format!(
                    "Foreign key of '{}' is not resolved",
                    attribute.role
                ))),
            };
        }

        let referring = match &to_one.key {
            ToOneKey::Referring { columns, .. } => {
                let key = self.select_all(&scope.tables, columns)?;
                let join = to_one.fetch == FetchTiming::Eager
                    && scope.depth < self.model.config().max_fetch_depth;
                if !join {
                    return Ok(Fetch::DelayedEntity(DelayedEntityFetch {
                        path,
                        position: attribute.position,
                        target: to_one.target,
                        key,
                    }));
                }
                key
            }
            // The key lives on the target's row; an inverse side is always joined.
            ToOneKey::Target { .. } => Vec::new(),
            ToOneKey::Pending => {
                return Err(OrmError::UnresolvedReference(format!(
                    "Foreign key of '{}' is not resolved",
                    attribute.role
                )));
            }
        };

        ancestry.push(attribute.role.clone());
        let entity = self.entity_shape(
            to_one.target,
            path.clone(),
            format!("{}_{}", scope.prefix, attribute.name),
            scope.depth + 1,
            Link::ToOne {
                owner_frame: scope.frame,
                owner_entity: scope.entity,
                attribute_name: attribute.name.clone(),
                mapped_by: to_one.mapped_by.clone(),
            },
            ancestry,
        );
        ancestry.pop();

        Ok(Fetch::Entity(EntityFetch {
            path,
            position: attribute.position,
            referring,
            not_found: to_one.not_found,
            entity: Box::new(entity?),
        }))
    }

    fn plural_fetch(
        &mut self,
        attribute: &'m PersistentAttribute,
        plural: &'m PluralAttribute,
        path: NavigablePath,
        scope: &Scope,
        ancestry: &mut Vec<NavigableRole>,
    ) -> Result<Fetch> {
        let model = self.model;
        let collection = model.collection(plural.collection);
        let classification = collection.classification;
        let circular = ancestry.contains(&attribute.role);
        let eager = collection.fetch == FetchTiming::Eager
            && scope.depth < model.config().max_fetch_depth;

        if classification.is_array() && circular {
            return Err(OrmError::UnsupportedOperation(format!(
                "Circular fetch of array '{}'",
                attribute.role
            )));
        }
        if circular || !(eager || classification.is_array()) {
            return Ok(Fetch::DelayedCollection(DelayedCollectionFetch {
                path,
                position: attribute.position,
                collection: plural.collection,
            }));
        }

        if classification == CollectionClassification::Bag && !self.joined_bags.contains(&attribute.role) {
            self.joined_bags.push(attribute.role.clone());
            if self.joined_bags.len() > 1 {
                let roles: Vec<String> = self.joined_bags.iter().map(ToString::to_string).collect();
                return Err(OrmError::mapping(format!(
                    "Cannot simultaneously join fetch multiple bags: {}",
                    roles.join(", ")
                )));
            }
        }

        let frame = self.next_collection_frame();
        let key = collection.key()?;
        let alias = format!("{}_{}", scope.prefix, attribute.name);
        let mut tables = TableGroup::new();
        if let Some(table) = collection.collection_table {
            tables.add(table, alias.clone());
        }
        let element_scope = Scope {
            path: path.append("{element}"),
            entity: scope.entity,
            frame: scope.frame,
            tables: tables.clone(),
            prefix: alias.clone(),
            depth: scope.depth + 1,
            link: scope.link.clone(),
            embedded: true,
        };

        let element = match &collection.element {
            CollectionElement::Entity { target, columns, .. } => {
                let element_alias = if collection.collection_table.is_some() {
                    format!("{}_element", alias)
                } else {
                    alias.clone()
                };
                ancestry.push(attribute.role.clone());
                let shape = self.entity_shape(
                    *target,
                    path.append("{element}"),
                    element_alias,
                    scope.depth + 1,
                    Link::Element {
                        owner_frame: scope.frame,
                        mapped_by: collection.mapped_by.clone(),
                    },
                    ancestry,
                );
                ancestry.pop();
                let shape = shape?;
                if collection.collection_table.is_none() {
                    for (table, table_alias) in shape.tables.aliases() {
                        tables.add(*table, table_alias.clone());
                    }
                }
                Fetch::Entity(EntityFetch {
                    path: path.append("{element}"),
                    position: 0,
                    referring: self.select_all(&tables, columns)?,
                    not_found: NotFoundAction::Exception,
                    entity: Box::new(shape),
                })
            }
            CollectionElement::Basic { column, converter, .. } => Fetch::Basic(BasicFetch {
                path: path.append("{element}"),
                position: 0,
                selection: self.select(&tables, *column)?,
                converter: converter.clone(),
            }),
            CollectionElement::Embedded { embeddable } => {
                self.embeddable_fetch(*embeddable, &element_scope, ancestry)?
            }
            CollectionElement::Unresolved => {
                return Err(OrmError::UnresolvedReference(format!(
                    "Element of collection '{}' is not resolved",
                    collection.role
                )));
            }
        };

        let index = match &collection.index {
            Some(CollectionIndex::Basic { column, .. }) => Some(Box::new(Fetch::Basic(BasicFetch {
                path: path.append("{index}"),
                position: 0,
                selection: self.select(&tables, *column)?,
                converter: None,
            }))),
            Some(CollectionIndex::Embedded { embeddable }) => {
                let index_scope = Scope {
                    path: path.append("{index}"),
                    tables: tables.clone(),
                    ..element_scope.clone()
                };
                Some(Box::new(self.embeddable_fetch(*embeddable, &index_scope, ancestry)?))
            }
            None => None,
        };

        let identifier = match &collection.identifier {
            Some(identifier) => Some(self.select(&tables, identifier.column)?),
            None => None,
        };

        Ok(Fetch::Plural(PluralFetch {
            path,
            position: attribute.position,
            collection: plural.collection,
            frame,
            key: self.select_all(&tables, &key.columns)?,
            identifier,
            index,
            element: Box::new(element),
        }))
    }

    fn embeddable_fetch(
        &mut self,
        embeddable: ManagedTypeId,
        scope: &Scope,
        ancestry: &mut Vec<NavigableRole>,
    ) -> Result<Fetch> {
        let mut fetches = Vec::new();
        for part in self.model.managed_type(embeddable).attributes() {
            fetches.push(self.attribute_fetch(part, scope, ancestry)?);
        }
        Ok(Fetch::Composite(CompositeFetch {
            path: scope.path.clone(),
            position: 0,
            embeddable,
            fetches,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::{AttributeMapping, BootModel, ElementMapping, ManagedTypeMapping, PluralMapping};
    use crate::config::ModelConfig;
    use crate::core::SqlType;
    use crate::shape::SqlSelectionCollector;

    fn node_model() -> RuntimeModel {
        let boot = BootModel::new().with_type(
            ManagedTypeMapping::entity("Node")
                .table("node")
                .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                .attribute(AttributeMapping::basic("name", "name", SqlType::Text))
                .attribute(AttributeMapping::many_to_one("parent", "Node", &["parent_id"])),
        );
        RuntimeModel::build(&boot, ModelConfig::default()).unwrap()
    }

    fn order_model() -> RuntimeModel {
        let boot = BootModel::new()
            .with_type(
                ManagedTypeMapping::entity("Order")
                    .table("orders")
                    .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                    .attribute(AttributeMapping::plural(
                        "lines",
                        PluralMapping::new(CollectionClassification::Bag, ElementMapping::one_to_many("Line"))
                            .mapped_by("order")
                            .eager(),
                    ))
                    .attribute(AttributeMapping::plural(
                        "notes",
                        PluralMapping::new(CollectionClassification::Bag, ElementMapping::basic("note", SqlType::Text))
                            .collection_table("order_notes", &["order_id"])
                            .eager(),
                    )),
            )
            .with_type(
                ManagedTypeMapping::entity("Line")
                    .table("line")
                    .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                    .attribute(AttributeMapping::many_to_one("order", "Order", &["order_id"])),
            );
        RuntimeModel::build(&boot, ModelConfig::default()).unwrap()
    }

    #[test]
    fn test_self_reference_stops_at_second_visit() {
        let model = node_model();
        let mut collector = SqlSelectionCollector::new();
        let shape = {
            let mut builder = ShapeBuilder::new(&model, &mut collector);
            builder.add_entity_result("Node", "n").unwrap();
            builder.build()
        };

        let kinds: Vec<(usize, &str, String)> = shape
            .walk()
            .into_iter()
            .map(|(depth, fetch)| (depth, fetch.kind_name(), fetch.path().full_path()))
            .collect();
        assert!(kinds.contains(&(0, "entity", "Node.parent".to_string())));
        assert!(kinds.contains(&(1, "self-referencing", "Node.parent.parent".to_string())));
        assert_eq!(shape.entity_frames(), 2);
        assert!(collector.labels().contains(&"n_parent.id".to_string()));
    }

    #[test]
    fn test_lazy_depth_limit_delays_to_one() {
        let boot = BootModel::new()
            .with_type(
                ManagedTypeMapping::entity("Node")
                    .table("node")
                    .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                    .attribute(AttributeMapping::many_to_one("parent", "Node", &["parent_id"])),
            );
        let model = RuntimeModel::build(&boot, ModelConfig::default().max_fetch_depth(0)).unwrap();
        let mut collector = SqlSelectionCollector::new();
        let mut builder = ShapeBuilder::new(&model, &mut collector);
        builder.add_entity_result("Node", "n").unwrap();
        let shape = builder.build();

        let DomainResult::Entity(root) = &shape.results()[0] else {
            panic!("expected entity result");
        };
        assert_eq!(root.fetches[0].kind_name(), "delayed-entity");
        assert_eq!(shape.entity_frames(), 1);
    }

    #[test]
    fn test_inverse_side_of_collection_is_bidirectional() {
        let boot = BootModel::new()
            .with_type(
                ManagedTypeMapping::entity("Order")
                    .table("orders")
                    .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                    .attribute(AttributeMapping::plural(
                        "lines",
                        PluralMapping::new(CollectionClassification::Bag, ElementMapping::one_to_many("Line"))
                            .mapped_by("order")
                            .eager(),
                    )),
            )
            .with_type(
                ManagedTypeMapping::entity("Line")
                    .table("line")
                    .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
                    .attribute(AttributeMapping::many_to_one("order", "Order", &["order_id"])),
            );
        let model = RuntimeModel::build(&boot, ModelConfig::default()).unwrap();
        let mut collector = SqlSelectionCollector::new();
        let mut builder = ShapeBuilder::new(&model, &mut collector);
        builder.add_entity_result("Order", "o").unwrap();
        let shape = builder.build();

        let walked = shape.walk();
        let (_, circular) = walked
            .iter()
            .find(|(_, fetch)| fetch.path().full_path() == "Order.lines.{element}.order")
            .unwrap();
        match circular {
            Fetch::Circular(circular) => {
                assert_eq!(circular.kind, CircularKind::Bidirectional);
                assert_eq!(circular.referenced_frame, Some(0));
            }
            other => panic!("unexpected fetch {:?}", other),
        }
        assert_eq!(shape.collection_frames(), 1);
        assert!(collector.labels().contains(&"o_lines.order_id".to_string()));
    }

    #[test]
    fn test_multiple_joined_bags_are_rejected() {
        let model = order_model();
        let mut collector = SqlSelectionCollector::new();
        let mut builder = ShapeBuilder::new(&model, &mut collector);
        let err = builder.add_entity_result("Order", "o").map(|_| ()).unwrap_err();
        assert!(matches!(err, OrmError::MappingError(ref message) if message.contains("multiple bags")));
    }

    #[test]
    fn test_scalar_result_uses_column_type() {
        let model = node_model();
        let mut collector = SqlSelectionCollector::new();
        let mut builder = ShapeBuilder::new(&model, &mut collector);
        builder.add_scalar_result("n", "node", "name", None).unwrap();
        assert!(builder.add_scalar_result("n", "node", "missing", None).is_err());
        let shape = builder.build();
        match &shape.results()[0] {
            DomainResult::Basic(basic) => assert_eq!(basic.selection.sql_type, SqlType::Text),
            other => panic!("unexpected result {:?}", other),
        }
    }
}
