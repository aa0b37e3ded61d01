//! Stale writes are rejected at prepare, listing every offender, without
//! touching the store.

use crate::common::*;
use parking_lot::Mutex;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_second_writer_is_rejected() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[("name", Value::from("original"))]);

    let mut first = engine.begin();
    let mut second = engine.begin();
    first.get_entity_state(&id).unwrap().set_property("name", "first");
    second.get_entity_state(&id).unwrap().set_property("name", "second");

    first.prepare().unwrap().commit().unwrap();
    let before = snapshot(&engine);

    let err = second.prepare().unwrap_err();
    assert_eq!(
        err,
        StoreError::ConcurrentModification {
            identities: vec![id.clone()]
        }
    );
    assert!(err.is_recoverable());
    assert_eq!(second.status(), UnitOfWorkStatus::Cancelled);
    assert_eq!(snapshot(&engine), before);
}

#[test]
fn test_every_stale_record_is_listed() {
    let engine = engine();
    let ids: Vec<_> = ["a", "b", "c", "d"].iter().map(|id| person(id)).collect();
    for id in &ids {
        create(&engine, id, &[]);
    }

    let mut slow = engine.begin();
    for id in &ids {
        slow.get_entity_state(id).unwrap().set_property("age", 1);
    }

    set(&engine, &ids[3], "age", 9).unwrap();
    set(&engine, &ids[1], "age", 9).unwrap();

    let err = slow.prepare().unwrap_err();
    assert_eq!(err.conflicting_identities(), &[ids[1].clone(), ids[3].clone()]);
    assert_eq!(version_of(&engine, &ids[0]), Some(0));
    assert_eq!(version_of(&engine, &ids[2]), Some(0));
}

#[test]
fn test_removal_of_stale_record_is_rejected() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[]);

    let mut remover = engine.begin();
    remover.remove_entity_state(&id).unwrap();
    set(&engine, &id, "age", 2).unwrap();

    assert!(remover.prepare().unwrap_err().is_conflict());
    assert_eq!(version_of(&engine, &id), Some(1));
}

#[test]
fn test_update_of_deleted_record_is_rejected() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[]);

    let mut writer = engine.begin();
    writer.get_entity_state(&id).unwrap().set_property("age", 2);
    remove(&engine, &id).unwrap();

    assert!(writer.prepare().unwrap_err().is_conflict());
    assert_eq!(version_of(&engine, &id), None);
}

#[test]
fn test_retry_after_reload_succeeds() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[("age", Value::Int(0))]);

    let mut stale = engine.begin();
    stale.get_entity_state(&id).unwrap().set_property("age", 100);
    set(&engine, &id, "age", 1).unwrap();
    let err = stale.prepare().unwrap_err();

    // Reload what conflicted and redo the change
    let mut retry = engine.begin();
    for conflicted in err.conflicting_identities() {
        let record = retry.get_entity_state(conflicted).unwrap();
        let age = record.property("age").and_then(Value::as_int).unwrap();
        record.set_property("age", age + 100);
    }
    retry.prepare().unwrap().commit().unwrap();

    assert_eq!(stored(&engine, &id).property("age"), Some(&Value::Int(101)));
    assert_eq!(version_of(&engine, &id), Some(2));
}

#[test]
fn test_racing_writers_commit_exactly_once_per_version() {
    let engine = Arc::new(engine());
    let id = person("race");
    create(&engine, &id, &[]);

    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));
    let winners = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            let winners = Arc::clone(&winners);
            let id = id.clone();
            thread::spawn(move || {
                let mut uow = engine.begin();
                uow.get_entity_state(&id).unwrap().set_property("age", t as i64);
                barrier.wait();
                match uow.prepare().and_then(|c| c.commit()) {
                    Ok(()) => winners.lock().push(t),
                    Err(e) => assert!(e.is_conflict(), "unexpected error: {}", e),
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let winners = winners.lock();
    assert_eq!(winners.len(), 1);
    let record = stored(&engine, &id);
    assert_eq!(record.version(), 1);
    assert_eq!(record.property("age"), Some(&Value::Int(winners[0] as i64)));
}
