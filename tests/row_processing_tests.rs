use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use rustmemorm::hierarchy::InheritanceStrategy;
use rustmemorm::metamodel::{BasicValueConverter, CollectionClassification, FetchTiming, NotFoundAction};
use rustmemorm::result::Row;
use rustmemorm::shape::{ShapeBuilder, SqlSelectionCollector};
use rustmemorm::{
    AttributeMapping, BootModel, ElementMapping, EventType, Identifier, IndexMapping, LoadEvent, LoadEventListener,
    LoadSession, ManagedTypeMapping, ModelConfig, ObjectValue, OrmError, PersistenceContext, PluralMapping,
    QueryResult, Result, ResultSetCursor, RuntimeModel, SessionConfig, SqlType, Status, Value,
};

fn int(value: i64) -> Value {
    Value::Integer(value)
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn id_attr() -> AttributeMapping {
    AttributeMapping::basic("id", "id", SqlType::Integer).id()
}

fn session_for(boot: BootModel, config: SessionConfig) -> LoadSession {
    let model = RuntimeModel::build(&boot, ModelConfig::default()).unwrap();
    LoadSession::new(Arc::new(model), config)
}

/// Run a query for `entity` whose rows are given under explicit column labels.
fn run(
    session: &mut LoadSession,
    entity: &str,
    alias: &str,
    columns: &[&str],
    rows: Vec<Row>,
) -> Result<Vec<Vec<ObjectValue>>> {
    let (shape, labels) = session.shape_for(entity, alias)?;
    let result = QueryResult::from_labeled(columns, rows)?.aligned_to(&labels);
    session.execute(&shape, &mut result.cursor())
}

fn entity(value: &ObjectValue) -> rustmemorm::EntityInstance {
    value.as_entity().cloned().expect("expected an entity")
}

#[derive(Debug, Default)]
struct RecordingListener {
    events: RefCell<Vec<LoadEvent>>,
}

impl LoadEventListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_load(&self, event: &LoadEvent) -> Result<()> {
        self.events.borrow_mut().push(event.clone());
        Ok(())
    }
}

fn point_model() -> BootModel {
    BootModel::new().with_type(
        ManagedTypeMapping::entity("Point")
            .table("point")
            .attribute(id_attr())
            .attribute(AttributeMapping::basic("x", "x", SqlType::Integer))
            .attribute(AttributeMapping::basic("y", "y", SqlType::Integer)),
    )
}

fn node_model() -> BootModel {
    BootModel::new().with_type(
        ManagedTypeMapping::entity("Node")
            .table("node")
            .attribute(id_attr())
            .attribute(AttributeMapping::basic("name", "name", SqlType::Text))
            .attribute(AttributeMapping::many_to_one("parent", "Node", &["parent_id"])),
    )
}

fn order_model() -> BootModel {
    BootModel::new()
        .with_type(
            ManagedTypeMapping::entity("Order")
                .table("orders")
                .attribute(id_attr())
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
                .attribute(id_attr())
                .attribute(AttributeMapping::many_to_one("order", "Order", &["order_id"]))
                .attribute(AttributeMapping::basic("product", "product", SqlType::Text)),
        )
}

const ORDER_COLUMNS: [&str; 4] = ["o.id", "o_lines.id", "o_lines.order_id", "o_lines.product"];

fn item_model(person: ManagedTypeMapping, timing: FetchTiming) -> BootModel {
    BootModel::new()
        .with_type(
            ManagedTypeMapping::entity("Item")
                .table("item")
                .attribute(id_attr())
                .attribute(AttributeMapping::many_to_one("owner", "Person", &["owner_id"]).fetch(timing)),
        )
        .with_type(
            person
                .table("person")
                .attribute(id_attr())
                .attribute(AttributeMapping::basic("name", "name", SqlType::Text)),
        )
}

#[test]
fn test_single_entity_is_loaded_and_managed() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let rows = run(
        &mut session,
        "Point",
        "p",
        &["p.id", "p.x", "p.y"],
        vec![vec![int(1), int(3), int(4)]],
    )
    .unwrap();

    assert_eq!(rows.len(), 1);
    let point = entity(&rows[0][0]);
    assert_eq!(point.identifier(), Some(ObjectValue::basic(1)));
    assert_eq!(point.get_value("x"), int(3));
    assert_eq!(point.get_value("y"), int(4));
    assert!(point.is_initialized());

    let key = session.entity_key("Point", Identifier::Simple(int(1))).unwrap();
    let entry = session.context().get_entry(&key).unwrap();
    assert_eq!(entry.status, Status::Managed);
    let found = session.find("Point", Identifier::Simple(int(1))).unwrap().unwrap();
    assert!(found.ptr_eq(&point));
}

#[test]
fn test_empty_result_loads_nothing() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let rows = run(&mut session, "Point", "p", &["p.id", "p.x", "p.y"], Vec::new()).unwrap();
    assert!(rows.is_empty());
    assert_eq!(session.context().entity_count(), 0);
}

#[test]
fn test_null_identifier_yields_null_result() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let rows = run(
        &mut session,
        "Point",
        "p",
        &["p.id", "p.x", "p.y"],
        vec![vec![Value::Null, int(3), int(4)]],
    )
    .unwrap();
    assert!(rows[0][0].is_null());
    assert_eq!(session.context().entity_count(), 0);
}

#[test]
fn test_entity_reached_twice_in_a_traversal_is_one_instance() {
    let mut session = session_for(node_model(), SessionConfig::default());
    let columns = ["n.id", "n.name", "n.parent_id", "n_parent.id", "n_parent.name", "n_parent.parent_id"];
    let rows = run(
        &mut session,
        "Node",
        "n",
        &columns,
        vec![
            vec![int(1), text("root"), Value::Null, Value::Null, Value::Null, Value::Null],
            vec![int(2), text("child"), int(1), int(1), text("root"), Value::Null],
        ],
    )
    .unwrap();

    let root = entity(&rows[0][0]);
    let child = entity(&rows[1][0]);
    let parent = entity(&child.get("parent").unwrap());
    assert!(parent.ptr_eq(&root));
    assert!(root.get("parent").unwrap().is_null());
    assert_eq!(session.context().entity_count(), 2);
}

#[test]
fn test_self_referencing_row_resolves_to_itself() {
    let mut session = session_for(node_model(), SessionConfig::default());
    let columns = ["n.id", "n.name", "n.parent_id", "n_parent.id", "n_parent.name", "n_parent.parent_id"];
    let rows = run(
        &mut session,
        "Node",
        "n",
        &columns,
        vec![vec![int(1), text("loop"), int(1), int(1), text("loop"), int(1)]],
    )
    .unwrap();

    let node = entity(&rows[0][0]);
    let parent = entity(&node.get("parent").unwrap());
    assert!(parent.ptr_eq(&node));
    assert_eq!(session.context().entity_count(), 1);
}

#[test]
fn test_repeated_rows_hydrate_once() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let listener = Rc::new(RecordingListener::default());
    session.listeners_mut().register(EventType::PostLoad, listener.clone());

    let rows = run(
        &mut session,
        "Point",
        "p",
        &["p.id", "p.x", "p.y"],
        vec![vec![int(1), int(3), int(4)], vec![int(1), int(99), int(99)]],
    )
    .unwrap();

    assert_eq!(rows.len(), 2);
    assert!(entity(&rows[0][0]).ptr_eq(&entity(&rows[1][0])));
    // The first row that introduced the entity supplies its state
    assert_eq!(entity(&rows[0][0]).get_value("x"), int(3));
    assert_eq!(listener.events.borrow().len(), 1);
}

#[test]
fn test_managed_entity_is_not_reloaded_by_a_later_query() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let listener = Rc::new(RecordingListener::default());
    session.listeners_mut().register(EventType::PostLoad, listener.clone());
    let columns = ["p.id", "p.x", "p.y"];

    let first = run(&mut session, "Point", "p", &columns, vec![vec![int(1), int(3), int(4)]]).unwrap();
    let second = run(&mut session, "Point", "p", &columns, vec![vec![int(1), int(7), int(8)]]).unwrap();

    let point = entity(&first[0][0]);
    assert!(point.ptr_eq(&entity(&second[0][0])));
    assert_eq!(point.get_value("x"), int(3));
    assert_eq!(listener.events.borrow().len(), 1);
}

#[test]
fn test_refresh_reloads_managed_state() {
    let mut session = session_for(point_model(), SessionConfig::default().refresh(true));
    let columns = ["p.id", "p.x", "p.y"];

    let first = run(&mut session, "Point", "p", &columns, vec![vec![int(1), int(3), int(4)]]).unwrap();
    run(&mut session, "Point", "p", &columns, vec![vec![int(1), int(7), int(8)]]).unwrap();

    let point = entity(&first[0][0]);
    assert_eq!(point.get_value("x"), int(7));
}

#[test]
fn test_events_fire_pre_then_post_with_positional_state() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let listener = Rc::new(RecordingListener::default());
    session.listeners_mut().register(EventType::PreLoad, listener.clone());
    session.listeners_mut().register(EventType::PostLoad, listener.clone());

    run(&mut session, "Point", "p", &["p.id", "p.x", "p.y"], vec![vec![int(1), int(3), int(4)]]).unwrap();

    let events = listener.events.borrow();
    let kinds: Vec<EventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(kinds, [EventType::PreLoad, EventType::PostLoad]);

    let descriptor = session.model().entity("Point").unwrap();
    let x = descriptor.attribute("x").unwrap().position;
    let y = descriptor.attribute("y").unwrap().position;
    assert_eq!(events[1].state[x], ObjectValue::basic(3));
    assert_eq!(events[1].state[y], ObjectValue::basic(4));
}

#[test]
fn test_mutable_load_keeps_a_separate_snapshot() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let listener = Rc::new(RecordingListener::default());
    session.listeners_mut().register(EventType::PostLoad, listener.clone());

    run(&mut session, "Point", "p", &["p.id", "p.x", "p.y"], vec![vec![int(1), int(3), int(4)]]).unwrap();

    let key = session.entity_key("Point", Identifier::Simple(int(1))).unwrap();
    let snapshot = session.context().get_entry(&key).unwrap().loaded_state.clone().unwrap();
    let live = listener.events.borrow()[0].state.clone();
    assert!(!Rc::ptr_eq(&snapshot, &live));
    assert_eq!(*snapshot, *live);
}

#[test]
fn test_read_only_load_shares_the_state() {
    let mut session = session_for(point_model(), SessionConfig::default().read_only(true));
    let listener = Rc::new(RecordingListener::default());
    session.listeners_mut().register(EventType::PostLoad, listener.clone());

    run(&mut session, "Point", "p", &["p.id", "p.x", "p.y"], vec![vec![int(1), int(3), int(4)]]).unwrap();

    let key = session.entity_key("Point", Identifier::Simple(int(1))).unwrap();
    let entry = session.context().get_entry(&key).unwrap();
    assert!(entry.is_read_only());
    let live = listener.events.borrow()[0].state.clone();
    assert!(Rc::ptr_eq(entry.loaded_state.as_ref().unwrap(), &live));
}

#[test]
fn test_immutable_entities_load_read_only() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Country")
            .immutable()
            .attribute(id_attr())
            .attribute(AttributeMapping::basic("name", "name", SqlType::Text)),
    );
    let mut session = session_for(boot, SessionConfig::default());
    run(&mut session, "Country", "c", &["c.id", "c.name"], vec![vec![int(1), text("NL")]]).unwrap();

    let key = session.entity_key("Country", Identifier::Simple(int(1))).unwrap();
    assert_eq!(session.context().get_entry(&key).unwrap().status, Status::ReadOnly);
}

#[test]
fn test_composite_identifier_round_trip() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Pair")
            .table("pair")
            .attribute(AttributeMapping::basic("a_num", "a_num", SqlType::Integer).id())
            .attribute(AttributeMapping::basic("b_code", "b_code", SqlType::Text).id())
            .attribute(AttributeMapping::basic("label", "label", SqlType::Text)),
    );
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(
        &mut session,
        "Pair",
        "p",
        &["p.a_num", "p.b_code", "p.label"],
        vec![vec![int(5), text("x"), text("five")]],
    )
    .unwrap();

    let pair = entity(&rows[0][0]);
    let identifier = pair.identifier().unwrap().to_identifier().unwrap();
    assert_eq!(identifier, Some(Identifier::Composite(vec![int(5), text("x")])));
    assert_eq!(pair.get_value("a_num"), int(5));
    assert_eq!(pair.get_value("b_code"), text("x"));

    let found = session
        .find("Pair", Identifier::Composite(vec![int(5), text("x")]))
        .unwrap()
        .unwrap();
    assert!(found.ptr_eq(&pair));
}

#[test]
fn test_discriminator_selects_the_concrete_subclass() {
    let boot = BootModel::new()
        .with_type(
            ManagedTypeMapping::entity("Animal")
                .table("animal")
                .discriminator("kind", SqlType::Text)
                .discriminator_value("A")
                .attribute(id_attr())
                .attribute(AttributeMapping::basic("name", "name", SqlType::Text)),
        )
        .with_type(
            ManagedTypeMapping::entity("Dog")
                .extends("Animal")
                .discriminator_value("D")
                .attribute(AttributeMapping::basic("breed", "breed", SqlType::Text)),
        );
    let mut session = session_for(boot, SessionConfig::default());
    let columns = ["a.id", "a.kind", "a.name", "a.breed"];
    let rows = run(
        &mut session,
        "Animal",
        "a",
        &columns,
        vec![
            vec![int(1), text("A"), text("generic"), Value::Null],
            vec![int(2), text("D"), text("rex"), text("collie")],
        ],
    )
    .unwrap();

    assert_eq!(entity(&rows[0][0]).entity_name(), "Animal");
    let dog = entity(&rows[1][0]);
    assert_eq!(dog.entity_name(), "Dog");
    assert_eq!(dog.get_value("breed"), text("collie"));
    assert_eq!(dog.get_value("name"), text("rex"));

    // The key is built on the hierarchy root, so a lookup through the root name finds the dog
    assert!(session.find("Animal", Identifier::Simple(int(2))).unwrap().unwrap().ptr_eq(&dog));
}

#[test]
fn test_discriminator_outside_the_queried_type_is_wrong_class() {
    let boot = BootModel::new()
        .with_type(
            ManagedTypeMapping::entity("Animal")
                .table("animal")
                .discriminator("kind", SqlType::Text)
                .discriminator_value("A")
                .attribute(id_attr()),
        )
        .with_type(
            ManagedTypeMapping::entity("Dog")
                .extends("Animal")
                .discriminator_value("D")
                .attribute(AttributeMapping::basic("breed", "breed", SqlType::Text)),
        );
    let mut session = session_for(boot, SessionConfig::default());

    let err = run(&mut session, "Dog", "d", &["d.id", "d.kind"], vec![vec![int(1), text("A")]]).unwrap_err();
    assert!(matches!(err, OrmError::WrongClass { .. }));

    let err = run(&mut session, "Animal", "a", &["a.id", "a.kind"], vec![vec![int(1), text("Z")]]).unwrap_err();
    assert!(matches!(err, OrmError::WrongClass { .. }));
    assert_eq!(session.context().entity_count(), 0);
}

#[test]
fn test_joined_subclass_row_is_detected_by_its_key() {
    let boot = BootModel::new()
        .with_type(
            ManagedTypeMapping::entity("Animal")
                .table("animal")
                .inheritance(InheritanceStrategy::Joined)
                .attribute(id_attr())
                .attribute(AttributeMapping::basic("name", "name", SqlType::Text)),
        )
        .with_type(
            ManagedTypeMapping::entity("Dog")
                .table("dog")
                .extends("Animal")
                .attribute(AttributeMapping::basic("breed", "breed", SqlType::Text)),
        );
    let mut session = session_for(boot, SessionConfig::default());
    let (_, labels) = session.shape_for("Animal", "a").unwrap();
    assert_eq!(labels, ["a.id", "a_1.id", "a.name", "a_1.breed"]);

    let rows = run(
        &mut session,
        "Animal",
        "a",
        &["a.id", "a.name", "a_1.id", "a_1.breed"],
        vec![
            vec![int(1), text("generic"), Value::Null, Value::Null],
            vec![int(2), text("rex"), int(2), text("collie")],
        ],
    )
    .unwrap();

    assert_eq!(entity(&rows[0][0]).entity_name(), "Animal");
    assert_eq!(entity(&rows[1][0]).entity_name(), "Dog");
    assert_eq!(entity(&rows[1][0]).get_value("breed"), text("collie"));
}

#[test]
fn test_bag_collects_elements_across_rows() {
    let mut session = session_for(order_model(), SessionConfig::default());
    let rows = run(
        &mut session,
        "Order",
        "o",
        &ORDER_COLUMNS,
        vec![
            vec![int(1), int(10), int(1), text("tea")],
            vec![int(1), int(11), int(1), text("milk")],
        ],
    )
    .unwrap();

    assert_eq!(rows.len(), 2);
    let order = entity(&rows[0][0]);
    assert!(order.ptr_eq(&entity(&rows[1][0])));

    let lines = order.get("lines").unwrap().as_collection().cloned().unwrap();
    assert!(lines.was_initialized());
    assert_eq!(lines.len(), 2);
    for line in lines.elements() {
        let back = entity(&entity(&line).get("order").unwrap());
        assert!(back.ptr_eq(&order));
    }
    assert_eq!(session.context().collection_count(), 1);
}

#[test]
fn test_unique_results_collapse_join_fetch_duplicates() {
    let mut session = session_for(order_model(), SessionConfig::default().unique_results(true));
    let rows = run(
        &mut session,
        "Order",
        "o",
        &ORDER_COLUMNS,
        vec![
            vec![int(1), int(10), int(1), text("tea")],
            vec![int(1), int(11), int(1), text("milk")],
        ],
    )
    .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_owner_without_elements_gets_an_empty_collection() {
    let mut session = session_for(order_model(), SessionConfig::default());
    let rows = run(
        &mut session,
        "Order",
        "o",
        &ORDER_COLUMNS,
        vec![vec![int(1), Value::Null, Value::Null, Value::Null]],
    )
    .unwrap();

    let lines = entity(&rows[0][0]).get("lines").unwrap().as_collection().cloned().unwrap();
    assert!(lines.was_initialized());
    assert!(lines.is_empty());
}

#[test]
fn test_list_elements_are_placed_by_index() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Doc")
            .table("doc")
            .attribute(id_attr())
            .attribute(AttributeMapping::plural(
                "tags",
                PluralMapping::new(CollectionClassification::List, ElementMapping::basic("tag", SqlType::Text))
                    .collection_table("doc_tags", &["doc_id"])
                    .index(IndexMapping::Basic {
                        column: "pos".to_string(),
                        sql_type: SqlType::Integer,
                        base: 1,
                    })
                    .eager(),
            )),
    );
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(
        &mut session,
        "Doc",
        "d",
        &["d.id", "d_tags.doc_id", "d_tags.pos", "d_tags.tag"],
        vec![
            vec![int(1), int(1), int(3), text("c")],
            vec![int(1), int(1), int(1), text("a")],
        ],
    )
    .unwrap();

    let tags = entity(&rows[0][0]).get("tags").unwrap().as_collection().cloned().unwrap();
    assert_eq!(
        tags.elements(),
        vec![ObjectValue::basic("a"), ObjectValue::Null, ObjectValue::basic("c")]
    );
}

#[test]
fn test_array_is_materialized_into_owner_state() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Sheet")
            .table("sheet")
            .attribute(id_attr())
            .attribute(AttributeMapping::plural(
                "scores",
                PluralMapping::new(CollectionClassification::Array, ElementMapping::basic("score", SqlType::Integer))
                    .collection_table("sheet_scores", &["sheet_id"])
                    .index(IndexMapping::basic("idx", SqlType::Integer)),
            )),
    );
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(
        &mut session,
        "Sheet",
        "s",
        &["s.id", "s_scores.sheet_id", "s_scores.idx", "s_scores.score"],
        vec![
            vec![int(1), int(1), int(1), int(20)],
            vec![int(1), int(1), int(0), int(10)],
        ],
    )
    .unwrap();

    let sheet = entity(&rows[0][0]);
    assert_eq!(
        sheet.get("scores"),
        Some(ObjectValue::Array(vec![ObjectValue::basic(10), ObjectValue::basic(20)]))
    );
    // Arrays belong to the owner's state, not to the context
    assert_eq!(session.context().collection_count(), 0);
}

#[test]
fn test_lazy_association_becomes_a_batched_proxy() {
    let boot = item_model(ManagedTypeMapping::entity("Person").batch_size(4), FetchTiming::Lazy);
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(
        &mut session,
        "Item",
        "i",
        &["i.id", "i.owner_id"],
        vec![vec![int(1), int(7)], vec![int(2), int(7)]],
    )
    .unwrap();

    let first = entity(&rows[0][0]).get("owner").unwrap();
    let second = entity(&rows[1][0]).get("owner").unwrap();
    let ObjectValue::Proxy(proxy) = &first else {
        panic!("expected a proxy, got {:?}", first);
    };
    assert!(proxy.is_uninitialized());
    assert_eq!(first, second);
    assert_eq!(session.context().proxy_count(), 1);

    let key = session.entity_key("Person", Identifier::Simple(int(7))).unwrap();
    assert!(session.context_mut().batch_fetch_queue().contains_entity_key(&key));

    // Loading the target binds the proxy and leaves the batch queue
    let people = run(&mut session, "Person", "p", &["p.id", "p.name"], vec![vec![int(7), text("ann")]]).unwrap();
    let person = entity(&people[0][0]);
    assert!(proxy.implementation().unwrap().ptr_eq(&person));
    assert!(!session.context_mut().batch_fetch_queue().contains_entity_key(&key));
}

#[test]
fn test_lazy_association_to_enhanced_entity_is_an_uninitialized_instance() {
    let boot = item_model(ManagedTypeMapping::entity("Person").enhanced(), FetchTiming::Lazy);
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(&mut session, "Item", "i", &["i.id", "i.owner_id"], vec![vec![int(1), int(7)]]).unwrap();

    let owner = entity(&entity(&rows[0][0]).get("owner").unwrap());
    assert!(!owner.is_initialized());
    assert_eq!(owner.identifier(), Some(ObjectValue::basic(7)));
    assert_eq!(session.context().proxy_count(), 0);

    let managed = session.find("Person", Identifier::Simple(int(7))).unwrap().unwrap();
    assert!(managed.ptr_eq(&owner));

    // A later load initializes the same instance in place
    run(&mut session, "Person", "p", &["p.id", "p.name"], vec![vec![int(7), text("ann")]]).unwrap();
    assert!(owner.is_initialized());
    assert_eq!(owner.get_value("name"), text("ann"));
}

#[test]
fn test_null_foreign_key_is_a_null_reference() {
    let boot = item_model(ManagedTypeMapping::entity("Person"), FetchTiming::Lazy);
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(&mut session, "Item", "i", &["i.id", "i.owner_id"], vec![vec![int(1), Value::Null]]).unwrap();
    assert!(entity(&rows[0][0]).get("owner").unwrap().is_null());
    assert_eq!(session.context().proxy_count(), 0);
}

#[test]
fn test_missing_joined_target_raises_unless_ignored() {
    let columns = ["i.id", "i.owner_id", "i_owner.id", "i_owner.name"];
    let dangling = vec![vec![int(1), int(7), Value::Null, Value::Null]];

    let boot = item_model(ManagedTypeMapping::entity("Person"), FetchTiming::Eager);
    let mut session = session_for(boot, SessionConfig::default());
    let err = run(&mut session, "Item", "i", &columns, dangling.clone()).unwrap_err();
    assert!(matches!(err, OrmError::ExecutionError(_)));

    let boot = BootModel::new()
        .with_type(
            ManagedTypeMapping::entity("Item")
                .table("item")
                .attribute(id_attr())
                .attribute(
                    AttributeMapping::many_to_one("owner", "Person", &["owner_id"]).not_found(NotFoundAction::Ignore),
                ),
        )
        .with_type(
            ManagedTypeMapping::entity("Person")
                .table("person")
                .attribute(id_attr())
                .attribute(AttributeMapping::basic("name", "name", SqlType::Text)),
        );
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(&mut session, "Item", "i", &columns, dangling).unwrap();
    assert!(entity(&rows[0][0]).get("owner").unwrap().is_null());
}

#[test]
fn test_tenant_mismatch_aborts_the_traversal() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Account")
            .table("account")
            .tenant_column("tenant_id")
            .attribute(id_attr())
            .attribute(AttributeMapping::basic("name", "name", SqlType::Text)),
    );
    let mut session = session_for(boot, SessionConfig::default().tenant("acme"));
    let columns = ["a.id", "a.tenant_id", "a.name"];

    let rows = run(&mut session, "Account", "a", &columns, vec![vec![int(1), text("acme"), text("ok")]]).unwrap();
    assert_eq!(rows.len(), 1);

    let err = run(&mut session, "Account", "a", &columns, vec![vec![int(2), text("other"), text("no")]]).unwrap_err();
    assert!(matches!(err, OrmError::ExecutionError(_)));
    assert!(session.find("Account", Identifier::Simple(int(2))).unwrap().is_none());
}

#[test]
fn test_version_and_natural_id_are_recorded() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Product")
            .table("product")
            .attribute(id_attr())
            .attribute(AttributeMapping::basic("sku", "sku", SqlType::Text).natural_id())
            .attribute(AttributeMapping::basic("version", "version", SqlType::Integer).version()),
    );
    let mut session = session_for(boot, SessionConfig::default());
    run(
        &mut session,
        "Product",
        "p",
        &["p.id", "p.sku", "p.version"],
        vec![vec![int(1), text("P-1"), int(3)]],
    )
    .unwrap();

    let key = session.entity_key("Product", Identifier::Simple(int(1))).unwrap();
    assert_eq!(session.context().get_entry(&key).unwrap().version, Some(int(3)));

    let root = session.model().entity("Product").unwrap().id;
    assert_eq!(
        session.context().find_natural_id_resolution(root, &[text("P-1")]),
        Some(Identifier::Simple(int(1)))
    );
}

#[test]
fn test_converter_applies_to_non_null_values() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Flag")
            .attribute(id_attr())
            .attribute(AttributeMapping::basic("active", "active", SqlType::Text).converter(BasicValueConverter::YesNo)),
    );
    let mut session = session_for(boot, SessionConfig::default());
    let rows = run(
        &mut session,
        "Flag",
        "f",
        &["f.id", "f.active"],
        vec![vec![int(1), text("Y")], vec![int(2), Value::Null]],
    )
    .unwrap();

    assert_eq!(entity(&rows[0][0]).get_value("active"), Value::Boolean(true));
    assert!(entity(&rows[1][0]).get("active").unwrap().is_null());
}

#[test]
fn test_scalar_results() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let mut collector = SqlSelectionCollector::new();
    let shape = {
        let mut builder = ShapeBuilder::new(session.model(), &mut collector);
        builder.add_scalar_result("p", "point", "x", None).unwrap();
        builder.build()
    };
    assert_eq!(collector.labels(), ["p.x"]);

    let result = QueryResult::from_labeled(&["p.x"], vec![vec![int(3)], vec![int(5)]]).unwrap();
    let rows = session.execute(&shape, &mut result.cursor()).unwrap();
    assert_eq!(rows, vec![vec![ObjectValue::basic(3)], vec![ObjectValue::basic(5)]]);
    assert_eq!(session.context().entity_count(), 0);
}

#[test]
fn test_unknown_entity_is_a_mapping_error() {
    let session = session_for(point_model(), SessionConfig::default());
    let err = session.shape_for("Line", "l").unwrap_err();
    assert!(err.is_mapping_error());
}

#[test]
fn test_short_row_is_a_result_set_error() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let (shape, _) = session.shape_for("Point", "p").unwrap();
    let result = QueryResult::new(vec!["p.id".to_string()], vec![vec![int(1)]]);
    let err = session.execute(&shape, &mut result.cursor()).unwrap_err();
    assert!(matches!(err, OrmError::ResultSetError(_)));
}

struct FailingCursor {
    rows: Vec<Row>,
    fail_at: usize,
    next: usize,
}

impl ResultSetCursor for FailingCursor {
    fn column_count(&self) -> usize {
        3
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.next == self.fail_at {
            return Err(OrmError::ResultSetError("connection reset".to_string()));
        }
        let row = self.rows.get(self.next).cloned();
        self.next += 1;
        Ok(row)
    }
}

#[test]
fn test_cursor_failure_leaves_nothing_managed() {
    let mut session = session_for(point_model(), SessionConfig::default());
    let (shape, labels) = session.shape_for("Point", "p").unwrap();
    let rows = QueryResult::from_labeled(
        &["p.id", "p.x", "p.y"],
        vec![vec![int(1), int(3), int(4)], vec![int(2), int(5), int(6)]],
    )
    .unwrap()
    .aligned_to(&labels)
    .rows;
    let mut cursor = FailingCursor { rows, fail_at: 1, next: 0 };

    let err = session.execute(&shape, &mut cursor).unwrap_err();
    assert!(matches!(err, OrmError::ResultSetError(_)));
    assert_eq!(session.context().entity_count(), 0);
    assert!(session.context().entries().next().is_none());
}

fn doc_with(name: &str, plural: PluralMapping) -> BootModel {
    BootModel::new().with_type(
        ManagedTypeMapping::entity("Doc")
            .table("doc")
            .attribute(id_attr())
            .attribute(AttributeMapping::plural(name, plural)),
    )
}

fn tag_list() -> PluralMapping {
    PluralMapping::new(CollectionClassification::List, ElementMapping::basic("tag", SqlType::Text))
        .collection_table("doc_tags", &["doc_id"])
        .index(IndexMapping::Basic {
            column: "pos".to_string(),
            sql_type: SqlType::Integer,
            base: 1,
        })
        .eager()
}

const TAG_COLUMNS: [&str; 4] = ["d.id", "d_tags.doc_id", "d_tags.pos", "d_tags.tag"];

fn tag_row(pos: Value, tag: &str) -> Row {
    vec![int(1), int(1), pos, text(tag)]
}

fn collection(value: &ObjectValue, name: &str) -> rustmemorm::PersistentCollection {
    entity(value).get(name).unwrap().as_collection().cloned().expect("expected a collection")
}

#[test]
fn test_list_index_below_the_base_is_rejected() {
    let mut session = session_for(doc_with("tags", tag_list()), SessionConfig::default());
    for pos in [int(0), int(i64::MIN)] {
        let err = run(&mut session, "Doc", "d", &TAG_COLUMNS, vec![tag_row(pos, "a")]).unwrap_err();
        assert!(matches!(err, OrmError::ResultSetError(_)), "{:?}", err);
    }
    assert_eq!(session.context().entity_count(), 0);
}

#[test]
fn test_list_index_above_the_cap_is_rejected() {
    let mut session = session_for(doc_with("tags", tag_list()), SessionConfig::default());
    let err = run(&mut session, "Doc", "d", &TAG_COLUMNS, vec![tag_row(int(i64::MAX), "a")]).unwrap_err();
    assert!(matches!(err, OrmError::ResultSetError(_)), "{:?}", err);

    let config = SessionConfig::default().max_collection_index(4);
    let mut session = session_for(doc_with("tags", tag_list()), config);
    assert!(run(&mut session, "Doc", "d", &TAG_COLUMNS, vec![tag_row(int(6), "a")]).is_err());
    let rows = run(&mut session, "Doc", "d", &TAG_COLUMNS, vec![tag_row(int(5), "e")]).unwrap();
    assert_eq!(collection(&rows[0][0], "tags").len(), 5);
}

#[test]
fn test_failed_refresh_keeps_the_managed_collection() {
    let mut session = session_for(doc_with("tags", tag_list()), SessionConfig::default().refresh(true));
    let rows = run(&mut session, "Doc", "d", &TAG_COLUMNS, vec![tag_row(int(1), "a")]).unwrap();
    let doc = entity(&rows[0][0]);
    let tags = collection(&rows[0][0], "tags");

    let err = run(
        &mut session,
        "Doc",
        "d",
        &TAG_COLUMNS,
        vec![tag_row(int(1), "b"), tag_row(Value::Null, "c")],
    )
    .unwrap_err();
    assert!(matches!(err, OrmError::ResultSetError(_)));
    assert_eq!(tags.elements(), vec![ObjectValue::basic("a")]);
    assert!(doc.get("tags").unwrap().as_collection().unwrap().ptr_eq(&tags));
    assert_eq!(session.context().collection_count(), 1);

    // A successful refresh swaps in the reloaded collection
    run(&mut session, "Doc", "d", &TAG_COLUMNS, vec![tag_row(int(1), "b")]).unwrap();
    let reloaded = doc.get("tags").unwrap().as_collection().cloned().unwrap();
    assert_eq!(reloaded.elements(), vec![ObjectValue::basic("b")]);
    assert_eq!(tags.elements(), vec![ObjectValue::basic("a")]);
    assert_eq!(session.context().collection_count(), 1);
}

#[test]
fn test_failed_traversal_registers_no_delayed_references() {
    let boot = item_model(ManagedTypeMapping::entity("Person").batch_size(4), FetchTiming::Lazy);
    let mut session = session_for(boot, SessionConfig::default());
    let err = run(
        &mut session,
        "Item",
        "i",
        &["i.id", "i.owner_id"],
        vec![vec![int(1), int(7)], vec![text("oops"), int(8)]],
    )
    .unwrap_err();
    assert!(matches!(err, OrmError::TypeMismatch(_)), "{:?}", err);

    let key = session.entity_key("Person", Identifier::Simple(int(7))).unwrap();
    assert!(session.context().get_proxy(&key).is_none());
    assert!(!session.context_mut().batch_fetch_queue().contains_entity_key(&key));
    assert!(session.find("Item", Identifier::Simple(int(1))).unwrap().is_none());
    assert_eq!(session.context().entity_count(), 0);

    let lazy_tags = PluralMapping::new(CollectionClassification::Set, ElementMapping::basic("tag", SqlType::Text))
        .collection_table("doc_tags", &["doc_id"]);
    let mut session = session_for(doc_with("tags", lazy_tags), SessionConfig::default());
    assert!(run(&mut session, "Doc", "d", &["d.id"], vec![vec![int(1)], vec![text("oops")]]).is_err());
    assert_eq!(session.context().collection_count(), 0);
}

#[derive(Debug)]
struct RejectingListener {
    rejected: Identifier,
}

impl LoadEventListener for RejectingListener {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn on_load(&self, event: &LoadEvent) -> Result<()> {
        if event.key.identifier() == &self.rejected {
            return Err(OrmError::ExecutionError(format!("{} rejected", event.key)));
        }
        Ok(())
    }
}

#[test]
fn test_post_load_failure_registers_nothing() {
    let mut session = session_for(point_model(), SessionConfig::default());
    session.listeners_mut().register(
        EventType::PostLoad,
        Rc::new(RejectingListener {
            rejected: Identifier::Simple(int(2)),
        }),
    );

    let err = run(
        &mut session,
        "Point",
        "p",
        &["p.id", "p.x", "p.y"],
        vec![vec![int(1), int(3), int(4)], vec![int(2), int(5), int(6)]],
    )
    .unwrap_err();
    assert!(matches!(err, OrmError::ExecutionError(_)));
    assert!(session.find("Point", Identifier::Simple(int(1))).unwrap().is_none());
    assert_eq!(session.context().entity_count(), 0);
    assert_eq!(session.context().entries().count(), 0);
}

#[test]
fn test_post_load_failure_restores_refreshed_instances() {
    let mut session = session_for(point_model(), SessionConfig::default().refresh(true));
    let columns = ["p.id", "p.x", "p.y"];
    let rows = run(&mut session, "Point", "p", &columns, vec![vec![int(1), int(3), int(4)]]).unwrap();
    let point = entity(&rows[0][0]);

    session.listeners_mut().register(
        EventType::PostLoad,
        Rc::new(RejectingListener {
            rejected: Identifier::Simple(int(2)),
        }),
    );
    let result = run(
        &mut session,
        "Point",
        "p",
        &columns,
        vec![vec![int(1), int(7), int(8)], vec![int(2), int(5), int(6)]],
    );
    assert!(result.is_err());

    assert_eq!(point.get_value("x"), int(3));
    assert!(point.is_initialized());
    let managed = session.find("Point", Identifier::Simple(int(1))).unwrap().unwrap();
    assert!(managed.ptr_eq(&point));
    assert_eq!(session.context().entity_count(), 1);
}

#[test]
fn test_set_keeps_one_copy_of_each_element() {
    let tags = PluralMapping::new(CollectionClassification::Set, ElementMapping::basic("tag", SqlType::Text))
        .collection_table("doc_tags", &["doc_id"])
        .eager();
    let mut session = session_for(doc_with("tags", tags), SessionConfig::default());
    let rows = run(
        &mut session,
        "Doc",
        "d",
        &["d.id", "d_tags.doc_id", "d_tags.tag"],
        vec![
            vec![int(1), int(1), text("a")],
            vec![int(1), int(1), text("b")],
            vec![int(1), int(1), text("a")],
        ],
    )
    .unwrap();

    let tags = collection(&rows[0][0], "tags");
    assert_eq!(tags.elements(), vec![ObjectValue::basic("a"), ObjectValue::basic("b")]);
}

fn attribute_map() -> PluralMapping {
    PluralMapping::new(CollectionClassification::Map, ElementMapping::basic("val", SqlType::Text))
        .collection_table("doc_attrs", &["doc_id"])
        .index(IndexMapping::basic("name", SqlType::Text))
        .eager()
}

const ATTR_COLUMNS: [&str; 4] = ["d.id", "d_attrs.doc_id", "d_attrs.name", "d_attrs.val"];

#[test]
fn test_map_keeps_the_first_value_for_a_key() {
    let mut session = session_for(doc_with("attrs", attribute_map()), SessionConfig::default());
    let rows = run(
        &mut session,
        "Doc",
        "d",
        &ATTR_COLUMNS,
        vec![
            vec![int(1), int(1), text("color"), text("red")],
            vec![int(1), int(1), text("size"), text("L")],
            vec![int(1), int(1), text("color"), text("blue")],
        ],
    )
    .unwrap();

    let attrs = collection(&rows[0][0], "attrs");
    assert_eq!(
        attrs.map_entries(),
        vec![
            (ObjectValue::basic("color"), ObjectValue::basic("red")),
            (ObjectValue::basic("size"), ObjectValue::basic("L")),
        ]
    );
}

#[test]
fn test_null_map_key_is_a_result_set_error() {
    let mut session = session_for(doc_with("attrs", attribute_map()), SessionConfig::default());
    let err = run(
        &mut session,
        "Doc",
        "d",
        &ATTR_COLUMNS,
        vec![vec![int(1), int(1), Value::Null, text("red")]],
    )
    .unwrap_err();
    assert!(matches!(err, OrmError::ResultSetError(_)), "{:?}", err);
    assert_eq!(session.context().collection_count(), 0);
}

#[test]
fn test_id_bag_deduplicates_by_row_identifier() {
    let tags = PluralMapping::new(CollectionClassification::IdBag, ElementMapping::basic("tag", SqlType::Text))
        .collection_table("doc_tags", &["doc_id"])
        .identifier_column("tag_id")
        .eager();
    let mut session = session_for(doc_with("tags", tags), SessionConfig::default());
    let rows = run(
        &mut session,
        "Doc",
        "d",
        &["d.id", "d_tags.doc_id", "d_tags.tag_id", "d_tags.tag"],
        vec![
            vec![int(1), int(1), int(10), text("a")],
            vec![int(1), int(1), int(11), text("a")],
            vec![int(1), int(1), int(10), text("a")],
        ],
    )
    .unwrap();

    let tags = collection(&rows[0][0], "tags");
    assert_eq!(tags.identifiers(), vec![int(10), int(11)]);
    assert_eq!(tags.elements(), vec![ObjectValue::basic("a"), ObjectValue::basic("a")]);
}

/// Records, per PreLoad event, how each state slot looks at that moment.
#[derive(Debug, Default)]
struct SlotKindListener {
    slots: RefCell<Vec<Vec<String>>>,
}

impl LoadEventListener for SlotKindListener {
    fn name(&self) -> &str {
        "slot-kinds"
    }

    fn on_load(&self, event: &LoadEvent) -> Result<()> {
        let kinds = event
            .state
            .iter()
            .map(|value| match value {
                ObjectValue::Array(values) => format!("array of {}", values.len()),
                ObjectValue::Collection(wrapper) if wrapper.was_initialized() => "initialized collection".into(),
                ObjectValue::Collection(_) => "pending collection".into(),
                other => other.kind_name().to_string(),
            })
            .collect();
        self.slots.borrow_mut().push(kinds);
        Ok(())
    }
}

#[test]
fn test_arrays_are_concrete_before_state_injection_while_lists_fill_after() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Sheet")
            .table("sheet")
            .attribute(id_attr())
            .attribute(AttributeMapping::plural(
                "scores",
                PluralMapping::new(CollectionClassification::Array, ElementMapping::basic("score", SqlType::Integer))
                    .collection_table("sheet_scores", &["sheet_id"])
                    .index(IndexMapping::basic("idx", SqlType::Integer)),
            ))
            .attribute(AttributeMapping::plural(
                "notes",
                PluralMapping::new(CollectionClassification::List, ElementMapping::basic("note", SqlType::Text))
                    .collection_table("sheet_notes", &["sheet_id"])
                    .index(IndexMapping::basic("pos", SqlType::Integer))
                    .eager(),
            )),
    );
    let mut session = session_for(boot, SessionConfig::default());
    let listener = Rc::new(SlotKindListener::default());
    session.listeners_mut().register(EventType::PreLoad, listener.clone());

    let rows = run(
        &mut session,
        "Sheet",
        "s",
        &[
            "s.id",
            "s_scores.sheet_id",
            "s_scores.idx",
            "s_scores.score",
            "s_notes.sheet_id",
            "s_notes.pos",
            "s_notes.note",
        ],
        vec![
            vec![int(1), int(1), int(0), int(10), int(1), int(0), text("x")],
            vec![int(1), int(1), int(1), int(20), int(1), int(0), text("x")],
        ],
    )
    .unwrap();

    let descriptor = session.model().entity("Sheet").unwrap();
    let scores = descriptor.attribute("scores").unwrap().position;
    let notes = descriptor.attribute("notes").unwrap().position;
    let slots = listener.slots.borrow();
    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0][scores], "array of 2");
    assert_eq!(slots[0][notes], "pending collection");

    let notes = collection(&rows[0][0], "notes");
    assert!(notes.was_initialized());
    assert_eq!(notes.elements(), vec![ObjectValue::basic("x")]);
}
