use conceptgen_core::{
    Attributes, BuildRequest, EventKind, Events, MemoryStore, PersistenceCode, PivotInfo,
    RecordStore, RelationInfo, RelationIntrospector, RelationKind, StoreError,
};
use serde_json::{Value, json};

fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(column, value)| (column.to_string(), value.clone()))
        .collect()
}

fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store
        .define(
            "Person",
            "default",
            attrs(&[("email", json!("person{n}@example.com"))]),
            "people.toml:3",
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
        )
        .define_relation(
            "Person",
            RelationInfo::new("friends", RelationKind::HasManyThrough, "Person", "friend_id"),
        );
    store
}

#[test]
fn build_persists_requested_count_with_overrides() {
    let store = store();
    let request = BuildRequest::new("Person")
        .overrides(attrs(&[("name", json!("Ada"))]))
        .count(3);

    let people = store.build(&request).expect("build people");

    assert_eq!(people.len(), 3);
    assert_eq!(store.count("Person"), 3);
    assert_eq!(people[1].get("email"), Some(&json!("person2@example.com")));
    assert!(people.iter().all(|person| person.get("name") == Some(&json!("Ada"))));
}

#[test]
fn unknown_template_is_reported() {
    let store = store();
    let err = store
        .build(&BuildRequest::new("Person").template(Some("vip".to_string())))
        .expect_err("missing template");
    assert!(matches!(err, StoreError::UnknownTemplate { .. }));

    let err = store
        .build(&BuildRequest::new("Ghost"))
        .expect_err("missing entity");
    assert!(matches!(err, StoreError::UnknownEntity(_)));
}

#[test]
fn unique_violation_carries_template_source() {
    let mut store = store();
    store.define("Person", "fixed", attrs(&[("email", json!("same@example.com"))]), "people.toml:9");
    store.define_rules(
        "Person",
        conceptgen_core::EntityRules {
            unique: vec!["email".to_string()],
            ..Default::default()
        },
    );

    let request = BuildRequest::new("Person").template(Some("fixed".to_string()));
    store.build(&request).expect("first build succeeds");
    let err = store.build(&request).expect_err("second build violates unique");

    match err {
        StoreError::Persistence {
            code,
            source_template,
            ..
        } => {
            assert_eq!(code, PersistenceCode::UniqueViolation);
            let source = source_template.expect("template source");
            assert_eq!(source.name, "fixed");
            assert_eq!(source.location, "people.toml:9");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn has_many_link_writes_foreign_key_on_related() {
    let store = store();
    let person = store.build(&BuildRequest::new("Person")).expect("person").remove(0);
    let pet = store.build(&BuildRequest::new("Pet")).expect("pet").remove(0);
    let relation = store.relation("Person", "pets").expect("pets relation");

    let mutations = store
        .relate(&person, &pet, &relation, Events::Suppress)
        .expect("relate");

    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].record.id(), pet.id());
    assert!(mutations[0].before.get("person_id").is_none());
    assert!(!mutations[0].inserted);
    assert_eq!(mutations[0].record.get("person_id"), Some(&json!(person.key)));
    assert!(
        store
            .events()
            .iter()
            .all(|event| event.kind != EventKind::Linked)
    );
}

#[test]
fn belongs_to_link_writes_foreign_key_on_root() {
    let store = store();
    let pet = store.build(&BuildRequest::new("Pet")).expect("pet").remove(0);
    let person = store.build(&BuildRequest::new("Person")).expect("person").remove(0);
    let relation = store.relation("Pet", "owner").expect("owner relation");

    let mutations = store
        .relate(&pet, &person, &relation, Events::Fire)
        .expect("relate");

    assert_eq!(mutations[0].record.id(), pet.id());
    assert_eq!(mutations[0].record.get("owner_id"), Some(&json!(person.key)));
    assert!(
        store
            .events()
            .iter()
            .any(|event| event.kind == EventKind::Linked && event.record == pet.id())
    );
}

#[test]
fn pivot_link_rejects_duplicates_and_detaches() {
    let store = store();
    let pet = store.build(&BuildRequest::new("Pet")).expect("pet").remove(0);
    let tag = store.build(&BuildRequest::new("Tag")).expect("tag").remove(0);
    let relation = store.relation("Pet", "tags").expect("tags relation");

    let mutations = store
        .relate(&pet, &tag, &relation, Events::Suppress)
        .expect("first link");
    assert_eq!(mutations[0].record.entity, "pet_tag");
    assert!(mutations[0].before.is_empty());
    assert!(mutations[0].inserted);

    let err = store
        .relate(&pet, &tag, &relation, Events::Suppress)
        .expect_err("duplicate link");
    assert!(err.is_duplicate_link());

    let detached = store
        .detach_all(&tag.id(), Events::Suppress)
        .expect("detach");
    assert_eq!(detached, 1);
    assert_eq!(store.count("pet_tag"), 0);
}

#[test]
fn through_relations_are_unsupported() {
    let store = store();
    let people = store
        .build(&BuildRequest::new("Person").count(2))
        .expect("people");
    let relation = store.relation("Person", "friends").expect("friends relation");

    let err = store
        .relate(&people[0], &people[1], &relation, Events::Suppress)
        .expect_err("unsupported");
    assert!(matches!(
        err,
        StoreError::UnsupportedRelationKind {
            kind: RelationKind::HasManyThrough,
            ..
        }
    ));
}

#[test]
fn suppressed_updates_and_deletes_emit_no_events() {
    let store = store();
    let person = store.build(&BuildRequest::new("Person")).expect("person").remove(0);
    let baseline = store.events().len();

    let updated = store
        .update(&person.id(), &attrs(&[("name", json!("Grace"))]), Events::Suppress)
        .expect("update");
    assert_eq!(updated.get("name"), Some(&json!("Grace")));
    assert!(store.delete(&person.id(), Events::Suppress).expect("delete"));
    assert!(!store.delete(&person.id(), Events::Suppress).expect("second delete"));

    assert_eq!(store.events().len(), baseline);
}
