//! Committing records that were read but not changed writes nothing.

use crate::common::*;

#[test]
fn test_read_only_commit_keeps_version_and_timestamp() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[("name", Value::from("alice"))]);
    set(&engine, &id, "age", 30).unwrap();
    let before = stored(&engine, &id);

    engine
        .unit_of_work(|uow| {
            let record = uow.get_entity_state(&id)?;
            assert_eq!(record.property("name"), Some(&Value::from("alice")));
            Ok(())
        })
        .unwrap();

    let after = stored(&engine, &id);
    assert_eq!(after.version(), before.version());
    assert_eq!(after.last_modified(), before.last_modified());
    assert_eq!(after, before);
}

#[test]
fn test_rejected_mutation_is_not_a_modification() {
    let engine = engine();
    let id = person("1");
    let friend = person("2");
    create(&engine, &id, &[]);
    engine
        .unit_of_work(|uow| {
            uow.get_entity_state(&id)?
                .add_many_association("friends", 0, friend.clone());
            Ok(())
        })
        .unwrap();
    assert_eq!(version_of(&engine, &id), Some(1));

    engine
        .unit_of_work(|uow| {
            let record = uow.get_entity_state(&id)?;
            assert!(!record.add_many_association("friends", 0, friend.clone()));
            assert!(record.remove_property("never-set").is_none());
            assert!(!record.is_modified());
            Ok(())
        })
        .unwrap();

    assert_eq!(version_of(&engine, &id), Some(1));
}

#[test]
fn test_noop_commit_alongside_real_write() {
    let engine = engine();
    let untouched = person("untouched");
    let touched = person("touched");
    create(&engine, &untouched, &[]);
    create(&engine, &touched, &[]);
    let before = stored(&engine, &untouched);

    engine
        .unit_of_work(|uow| {
            uow.get_entity_state(&untouched)?;
            uow.get_entity_state(&touched)?.set_property("age", 1);
            Ok(())
        })
        .unwrap();

    assert_eq!(stored(&engine, &untouched), before);
    assert_eq!(version_of(&engine, &touched), Some(1));
}

#[test]
fn test_pending_operations_reflect_noop() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[]);

    let mut uow = engine.begin();
    uow.get_entity_state(&id).unwrap();
    assert!(uow.pending_operations().is_empty());
    uow.prepare().unwrap().commit().unwrap();
    assert_eq!(uow.status(), UnitOfWorkStatus::Committed);
}
