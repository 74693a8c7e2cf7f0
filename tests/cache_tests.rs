use std::sync::Arc;
use rustmemorm::cache::{AccessType, CacheEntry, CacheMode, CachedValue, InMemoryRegionFactory};
use rustmemorm::{
    AttributeMapping, BootModel, Identifier, LoadSession, ManagedTypeMapping, ModelConfig, QueryResult,
    RuntimeModel, SessionConfig, SqlType, Value,
};

fn point_model(config: ModelConfig) -> Arc<RuntimeModel> {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Point")
            .table("point")
            .cached(AccessType::ReadWrite)
            .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
            .attribute(AttributeMapping::basic("x", "x", SqlType::Integer))
            .attribute(AttributeMapping::basic("y", "y", SqlType::Integer)),
    );
    let regions = InMemoryRegionFactory::new(16);
    Arc::new(RuntimeModel::build_with_cache(&boot, config, &regions).unwrap())
}

fn load_point(session: &mut LoadSession, id: i64, x: i64, y: i64) {
    let (shape, labels) = session.shape_for("Point", "p").unwrap();
    let result = QueryResult::from_labeled(
        &["p.id", "p.x", "p.y"],
        vec![vec![Value::Integer(id), Value::Integer(x), Value::Integer(y)]],
    )
    .unwrap()
    .aligned_to(&labels);
    session.execute(&shape, &mut result.cursor()).unwrap();
}

fn cached_x(session: &LoadSession, id: i64) -> Option<Value> {
    match session.cached_state("Point", Identifier::Simple(Value::Integer(id))).unwrap()? {
        CacheEntry::Standard { state, .. } => match state.first() {
            Some(CachedValue::Basic { value }) => Some(value.clone()),
            _ => None,
        },
        CacheEntry::Structured(_) => None,
    }
}

#[test]
fn test_load_puts_disassembled_state() {
    let model = point_model(ModelConfig::default());
    let mut session = LoadSession::new(model, SessionConfig::default());
    load_point(&mut session, 1, 3, 4);

    let entry = session
        .cached_state("Point", Identifier::Simple(Value::Integer(1)))
        .unwrap()
        .unwrap();
    assert_eq!(
        entry,
        CacheEntry::Standard {
            subclass: "Point".to_string(),
            version: None,
            state: vec![
                CachedValue::Basic { value: Value::Integer(3) },
                CachedValue::Basic { value: Value::Integer(4) },
            ],
        }
    );
}

#[test]
fn test_cache_is_shared_between_sessions() {
    let model = point_model(ModelConfig::default());
    let mut first = LoadSession::new(model.clone(), SessionConfig::default());
    load_point(&mut first, 1, 3, 4);

    let second = LoadSession::new(model, SessionConfig::default());
    assert_eq!(cached_x(&second, 1), Some(Value::Integer(3)));
}

#[test]
fn test_minimal_puts_keep_the_existing_entry() {
    let model = point_model(ModelConfig::default());
    let mut first = LoadSession::new(model.clone(), SessionConfig::default());
    load_point(&mut first, 1, 3, 4);

    let mut second = LoadSession::new(model.clone(), SessionConfig::default().minimal_puts(true));
    load_point(&mut second, 1, 5, 4);
    assert_eq!(cached_x(&second, 1), Some(Value::Integer(3)));

    // Refresh mode bypasses minimal puts
    let mut third = LoadSession::new(
        model.clone(),
        SessionConfig::default().minimal_puts(true).cache_mode(CacheMode::Refresh),
    );
    load_point(&mut third, 1, 6, 4);
    let reader = LoadSession::new(model, SessionConfig::default());
    assert_eq!(cached_x(&reader, 1), Some(Value::Integer(6)));
}

#[test]
fn test_entity_inserted_in_this_transaction_updates_the_cache() {
    let model = point_model(ModelConfig::default());
    let mut first = LoadSession::new(model.clone(), SessionConfig::default());
    load_point(&mut first, 1, 3, 4);

    let mut second = LoadSession::new(model, SessionConfig::default().minimal_puts(true));
    let key = second.entity_key("Point", Identifier::Simple(Value::Integer(1))).unwrap();
    second.context_mut().register_insert(key);
    load_point(&mut second, 1, 5, 4);
    assert_eq!(cached_x(&second, 1), Some(Value::Integer(5)));
}

#[test]
fn test_get_mode_never_writes() {
    let model = point_model(ModelConfig::default());
    let mut session = LoadSession::new(model, SessionConfig::default().cache_mode(CacheMode::Get));
    load_point(&mut session, 1, 3, 4);
    assert_eq!(cached_x(&session, 1), None);
}

#[test]
fn test_ignore_mode_neither_reads_nor_writes() {
    let model = point_model(ModelConfig::default());
    let mut writer = LoadSession::new(model.clone(), SessionConfig::default());
    load_point(&mut writer, 1, 3, 4);

    let mut session = LoadSession::new(model, SessionConfig::default().cache_mode(CacheMode::Ignore));
    load_point(&mut session, 2, 7, 8);
    assert!(session.cached_state("Point", Identifier::Simple(Value::Integer(1))).unwrap().is_none());
    assert_eq!(cached_x(&writer, 2), None);
}

#[test]
fn test_structured_entries_are_keyed_by_attribute_name() {
    let model = point_model(ModelConfig::default().structured_cache_entries(true));
    let mut session = LoadSession::new(model, SessionConfig::default());
    load_point(&mut session, 1, 3, 4);

    let entry = session
        .cached_state("Point", Identifier::Simple(Value::Integer(1)))
        .unwrap()
        .unwrap();
    assert_eq!(entry.subclass(), Some("Point"));
    let CacheEntry::Structured(map) = entry else {
        panic!("expected a structured entry");
    };
    assert!(map.get("x").is_some());
    assert!(map.get("y").is_some());
}

#[test]
fn test_uncached_hierarchy_has_no_cache_state() {
    let boot = BootModel::new().with_type(
        ManagedTypeMapping::entity("Point")
            .attribute(AttributeMapping::basic("id", "id", SqlType::Integer).id())
            .attribute(AttributeMapping::basic("x", "x", SqlType::Integer))
            .attribute(AttributeMapping::basic("y", "y", SqlType::Integer)),
    );
    let model = Arc::new(RuntimeModel::build(&boot, ModelConfig::default()).unwrap());
    let mut session = LoadSession::new(model, SessionConfig::default());
    load_point(&mut session, 1, 3, 4);
    assert!(cached_x(&session, 1).is_none());
}
