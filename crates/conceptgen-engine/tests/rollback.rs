use std::rc::Rc;

use conceptgen_core::{
    Attributes, EntityRules, EventKind, Events, MemoryStore, PivotInfo, RecordStore,
    RelationInfo, RelationKind, StoreError,
};
use conceptgen_engine::{
    Backend, ConceptDefinition, ConceptEngine, ModelLibrary, Nested, RelationDeclaration,
    Resolved,
};
use serde_json::{Value, json};

fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

fn store() -> Rc<MemoryStore> {
    let mut store = MemoryStore::new();
    store
        .define(
            "Person",
            "default",
            attrs(&[("email", json!("person{n}@example.com"))]),
            "people.toml:2",
        )
        .define("Pet", "default", attrs(&[("name", json!("Pet {n}"))]), "pets.toml:1")
        .define("Tag", "default", attrs(&[("label", json!("tag-{n}"))]), "tags.toml:1")
        .define_relation(
            "Person",
            RelationInfo::new("pets", RelationKind::HasMany, "Pet", "person_id"),
        )
        .define_relation(
            "Pet",
            RelationInfo::new("owner", RelationKind::BelongsTo, "Person", "owner_id"),
        )
        .define_relation(
            "Pet",
            RelationInfo::new("tags", RelationKind::BelongsToMany, "Tag", "pet_id").with_pivot(
                PivotInfo {
                    table: "pet_tag".to_string(),
                    foreign_pivot_key: "pet_id".to_string(),
                    related_pivot_key: "tag_id".to_string(),
                },
            ),
        );
    Rc::new(store)
}

fn engine(store: &Rc<MemoryStore>, definition: ConceptDefinition) -> ConceptEngine {
    ConceptEngine::new(definition, Backend::from_store(store.clone()))
}

#[test]
fn rollback_removes_every_generated_record() {
    let store = store();
    let definition =
        ConceptDefinition::new("PersonWithPets", "Person").relation(RelationDeclaration::new("pets"));
    let mut engine = engine(&store, definition);

    engine.create(&Attributes::new(), None).expect("create concept");
    assert_eq!(store.total_records(), 3);

    let log = engine.action_log();
    let report = log.rollback(store.as_ref()).expect("rollback");

    assert_eq!(report.deleted, 3);
    assert_eq!(report.restored, 0);
    assert_eq!(store.total_records(), 0);
    assert!(log.is_empty());
}

#[test]
fn rollback_detaches_pivot_rows_and_factory_records() {
    let store = store();
    let definition = ConceptDefinition::new("TaggedPet", "Pet")
        .relation(RelationDeclaration::new("tags"))
        .relation(RelationDeclaration::new("owner"));
    let mut engine = engine(&store, definition);

    engine.create(&Attributes::new(), None).expect("create concept");
    assert_eq!(store.count("Tag"), 2);
    assert_eq!(store.count("pet_tag"), 2);
    assert_eq!(store.count("Person"), 1);

    engine
        .action_log()
        .rollback(store.as_ref())
        .expect("rollback");

    assert_eq!(store.total_records(), 0);
}

#[test]
fn rollback_restores_updated_records_without_events() {
    let store = store();
    let existing = store
        .insert(
            "Person",
            attrs(&[("email", json!("ann@example.com")), ("name", json!("Ann"))]),
        )
        .expect("insert person");
    let mut engine = engine(&store, ConceptDefinition::new("Renamed", "Person"));
    engine.set_model(existing.clone()).expect("attach model");
    engine
        .create(&attrs(&[("name", json!("Bob"))]), None)
        .expect("update concept");
    let events_before = store.events().len();

    let report = engine
        .action_log()
        .rollback(store.as_ref())
        .expect("rollback");

    assert_eq!(report.restored, 1);
    let restored = store
        .find(&existing.id())
        .expect("find")
        .expect("person still exists");
    assert_eq!(restored.get("name"), Some(&json!("Ann")));
    assert_eq!(store.events().len(), events_before);
    assert!(
        !store
            .events()
            .iter()
            .any(|event| event.kind == EventKind::Deleted)
    );
}

#[test]
fn nested_engines_share_the_outer_ledger() {
    let store = store();
    let definition = ConceptDefinition::new("PersonWithPets", "Person")
        .relation(RelationDeclaration::new("pets"))
        .handler("pets", |_| {
            Ok(Nested::Concept(
                ConceptDefinition::new("TaggedPet", "Pet")
                    .relation(RelationDeclaration::new("tags").count(1)),
            ))
        });
    let mut engine = engine(&store, definition);

    let person = engine.create(&Attributes::new(), None).expect("create concept");
    assert!(matches!(person, Resolved::Single(_)));
    assert_eq!(store.total_records(), 4);

    engine
        .action_log()
        .rollback(store.as_ref())
        .expect("rollback");
    assert_eq!(store.total_records(), 0);
}

#[test]
fn rollback_tolerates_records_removed_meanwhile() {
    let store = store();
    let definition =
        ConceptDefinition::new("PersonWithPets", "Person").relation(RelationDeclaration::new("pets"));
    let mut engine = engine(&store, definition);
    engine.create(&Attributes::new(), None).expect("create concept");

    let pet = store.records("Pet")[0].id();
    store
        .delete(&pet, Events::Fire)
        .expect("delete pet");

    let report = engine
        .action_log()
        .rollback(store.as_ref())
        .expect("rollback");
    assert_eq!(report.missing, 1);
    assert_eq!(report.deleted, 2);
    assert_eq!(store.total_records(), 0);
}

#[test]
fn rollback_keeps_an_attached_root_that_gained_a_link() {
    let store = store();
    let rex = store
        .insert("Pet", attrs(&[("name", json!("Rex"))]))
        .expect("insert pet");
    let definition =
        ConceptDefinition::new("OwnedPet", "Pet").relation(RelationDeclaration::new("owner"));
    let mut engine = engine(&store, definition);
    engine.set_model(rex.clone()).expect("attach model");
    engine.create(&Attributes::new(), None).expect("link owner");
    assert_eq!(store.count("Person"), 1);

    let report = engine
        .action_log()
        .rollback(store.as_ref())
        .expect("rollback");

    assert_eq!(report.deleted, 1);
    assert_eq!(report.restored, 1);
    assert_eq!(store.count("Person"), 0);
    let restored = store.find(&rex.id()).expect("find").expect("rex survives rollback");
    assert_eq!(restored.get("name"), Some(&json!("Rex")));
    assert!(restored.get("owner_id").is_none_or(Value::is_null));
}

#[test]
fn rollback_keeps_library_records_linked_through_has_many() {
    let store = store();
    let rex = store
        .insert("Pet", attrs(&[("name", json!("Rex"))]))
        .expect("insert pet");
    let mut library = ModelLibrary::new();
    library.insert("pets", Resolved::Single(rex.clone()));
    let definition =
        ConceptDefinition::new("PersonWithPets", "Person").relation(RelationDeclaration::new("pets"));
    let mut engine = engine(&store, definition);
    engine.set_model_library(library);

    engine.create(&Attributes::new(), None).expect("create concept");
    let log = engine.action_log();
    assert_eq!(log.len(), 2);

    let report = log.rollback(store.as_ref()).expect("rollback");

    assert_eq!(report.deleted, 1);
    assert_eq!(report.restored, 1);
    assert_eq!(store.count("Person"), 0);
    let restored = store.find(&rex.id()).expect("find").expect("rex survives rollback");
    assert!(restored.get("person_id").is_none_or(Value::is_null));
}

#[test]
fn failed_rollback_keeps_pending_actions_for_a_retry() {
    let mut store = MemoryStore::new();
    store.define_rules(
        "Person",
        EntityRules {
            unique: vec!["email".to_string()],
            ..EntityRules::default()
        },
    );
    let store = Rc::new(store);
    let ann = store
        .insert("Person", attrs(&[("email", json!("ann@example.com"))]))
        .expect("insert person");
    let mut engine = engine(&store, ConceptDefinition::new("Renamed", "Person"));
    engine.set_model(ann.clone()).expect("attach model");
    engine
        .create(&attrs(&[("email", json!("bob@example.com"))]), None)
        .expect("update concept");

    let squatter = store
        .insert("Person", attrs(&[("email", json!("ann@example.com"))]))
        .expect("insert squatter");
    let log = engine.action_log();
    let err = log.rollback(store.as_ref()).expect_err("unique email blocks restore");
    assert!(matches!(err, StoreError::Persistence { .. }));
    assert_eq!(log.len(), 1);

    store.delete(&squatter.id(), Events::Fire).expect("delete squatter");
    let report = log.rollback(store.as_ref()).expect("retry rollback");
    assert_eq!(report.restored, 1);
    assert!(log.is_empty());
    let restored = store.find(&ann.id()).expect("find").expect("ann exists");
    assert_eq!(restored.get("email"), Some(&json!("ann@example.com")));
}
