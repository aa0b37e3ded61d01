//! A deleted identity can be created again and starts over at version 0.

use crate::common::*;

#[test]
fn test_recreate_after_delete_resets_version() {
    let engine = engine();
    let id = person("phoenix");
    create(&engine, &id, &[("name", Value::from("first life"))]);
    set(&engine, &id, "age", 1).unwrap();
    set(&engine, &id, "age", 2).unwrap();
    assert_eq!(version_of(&engine, &id), Some(2));

    remove(&engine, &id).unwrap();
    assert_eq!(version_of(&engine, &id), None);
    assert!(matches!(
        engine.begin().get_entity_state(&id),
        Err(StoreError::EntityNotFound(_))
    ));

    create(&engine, &id, &[("name", Value::from("second life"))]);
    let record = stored(&engine, &id);
    assert_eq!(record.version(), INITIAL_VERSION);
    assert_eq!(record.property("name"), Some(&Value::from("second life")));
    assert_eq!(record.property("age"), Some(&Value::Null));
}

#[test]
fn test_writer_of_old_incarnation_is_rejected() {
    let engine = engine();
    let id = person("x");
    create(&engine, &id, &[("name", Value::from("original"))]);

    // Read at version 0 of the first incarnation
    let mut slow = engine.begin();
    slow.get_entity_state(&id)
        .unwrap()
        .set_property("name", "stale-edit");

    remove(&engine, &id).unwrap();
    create(&engine, &id, &[("name", Value::from("recreated"))]);
    assert_eq!(version_of(&engine, &id), Some(0));

    let err = slow.prepare().and_then(|c| c.commit()).unwrap_err();
    assert_eq!(err.conflicting_identities(), &[id.clone()]);
    let record = stored(&engine, &id);
    assert_eq!(record.version(), 0);
    assert_eq!(record.property("name"), Some(&Value::from("recreated")));
}

#[test]
fn test_prepared_writer_of_old_incarnation_is_rejected_at_commit() {
    let engine = engine();
    let id = person("x");
    create(&engine, &id, &[("name", Value::from("original"))]);

    let mut slow = engine.begin();
    slow.get_entity_state(&id)
        .unwrap()
        .set_property("name", "stale-edit");
    let committer = slow.prepare().unwrap();

    remove(&engine, &id).unwrap();
    create(&engine, &id, &[("name", Value::from("recreated"))]);
    let before = snapshot(&engine);

    assert!(committer.commit().unwrap_err().is_conflict());
    assert_eq!(snapshot(&engine), before);
}

#[test]
fn test_remover_of_old_incarnation_is_rejected() {
    let engine = engine();
    let id = person("x");
    create(&engine, &id, &[]);

    let mut slow = engine.begin();
    slow.remove_entity_state(&id).unwrap();

    remove(&engine, &id).unwrap();
    create(&engine, &id, &[("name", Value::from("recreated"))]);

    assert!(slow.prepare().unwrap_err().is_conflict());
    assert!(engine.store().contains(&id));
}

#[test]
fn test_recreated_record_gets_new_incarnation() {
    let engine = engine();
    let id = person("x");
    create(&engine, &id, &[]);
    let first = stored(&engine, &id).stamp();

    remove(&engine, &id).unwrap();
    create(&engine, &id, &[]);
    let second = stored(&engine, &id).stamp();

    assert_eq!(first.version, second.version);
    assert_ne!(first.incarnation, second.incarnation);
}

#[test]
fn test_recreate_within_removing_unit_is_rejected() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[]);

    let mut uow = engine.begin();
    uow.remove_entity_state(&id).unwrap();
    assert_eq!(
        uow.new_entity_state(&id).unwrap_err(),
        StoreError::EntityAlreadyExists(id.clone())
    );
}

#[test]
fn test_delete_is_idempotent_at_store_level() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[]);

    let mut first = engine.begin();
    let mut second = engine.begin();
    first.remove_entity_state(&id).unwrap();
    second.remove_entity_state(&id).unwrap();

    let a = first.prepare().unwrap();
    let b = second.prepare().unwrap();
    a.commit().unwrap();
    b.commit().unwrap();
    assert!(!engine.store().contains(&id));
}
