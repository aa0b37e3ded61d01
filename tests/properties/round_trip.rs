//! What a unit of work commits is what the next one reads.

use crate::common::*;

#[test]
fn test_new_record_round_trip() {
    let engine = engine();
    let id = person("alice");
    let employer = company("acme");
    let friends = [person("bob"), person("carol")];

    engine
        .unit_of_work(|uow| {
            let record = uow.new_entity_state(&id)?;
            assert_eq!(record.status(), EntityStatus::New);
            assert_eq!(record.version(), INITIAL_VERSION);
            record.set_property("name", "Alice");
            record.set_property("age", 34);
            record.set_association("employer", Some(employer.clone()));
            for friend in &friends {
                record.add_many_association("friends", usize::MAX, friend.clone());
            }
            record.put_named_association("contacts", "manager", person("dave"));
            record.put_named_association("contacts", "assistant", person("erin"));
            Ok(())
        })
        .unwrap();

    let mut uow = engine.begin();
    let record = uow.get_entity_state(&id).unwrap();
    assert_eq!(record.status(), EntityStatus::Loaded);
    assert_eq!(record.version(), INITIAL_VERSION);
    assert_ne!(record.incarnation(), UNASSIGNED_INCARNATION);
    assert!(!record.is_modified());
    assert_eq!(record.property("name"), Some(&Value::from("Alice")));
    assert_eq!(record.property("age"), Some(&Value::Int(34)));
    assert_eq!(record.association("employer"), Some(&employer));

    let stored_friends = record.many_association("friends").unwrap();
    assert_eq!(stored_friends.kind(), ManyAssociationKind::Set);
    assert_eq!(stored_friends.as_slice(), &friends);

    let visits = record.many_association("visits").unwrap();
    assert_eq!(visits.kind(), ManyAssociationKind::List);
    assert!(visits.is_empty());

    let contacts = record.named_association("contacts").unwrap();
    assert_eq!(
        contacts.iter().collect::<Vec<_>>(),
        vec![
            (&"assistant".to_string(), &person("erin")),
            (&"manager".to_string(), &person("dave")),
        ]
    );
}

#[test]
fn test_named_association_update_round_trip() {
    let engine = engine();
    let id = person("1");
    engine
        .unit_of_work(|uow| {
            uow.new_entity_state(&id)?
                .put_named_association("contacts", "manager", person("a"));
            Ok(())
        })
        .unwrap();

    engine
        .unit_of_work(|uow| {
            let record = uow.get_entity_state(&id)?;
            record.put_named_association("contacts", "manager", person("b"));
            record.put_named_association("contacts", "mentor", person("c"));
            Ok(())
        })
        .unwrap();
    engine
        .unit_of_work(|uow| {
            uow.get_entity_state(&id)?
                .remove_named_association("contacts", "mentor");
            Ok(())
        })
        .unwrap();

    let record = stored(&engine, &id);
    assert_eq!(record.version(), 2);
    assert_eq!(record.named_association_target("contacts", "manager"), Some(&person("b")));
    assert_eq!(record.named_association_target("contacts", "mentor"), None);
}

#[test]
fn test_update_round_trip() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[("name", Value::from("a")), ("age", Value::Int(1))]);

    engine
        .unit_of_work(|uow| {
            let record = uow.get_entity_state(&id)?;
            record.set_property("name", "b");
            record.remove_property("age");
            record.set_association("employer", None);
            Ok(())
        })
        .unwrap();

    let record = stored(&engine, &id);
    assert_eq!(record.version(), 1);
    assert_eq!(record.property("name"), Some(&Value::from("b")));
    assert_eq!(record.property("age"), None);
    assert_eq!(record.association("employer"), None);
    assert_eq!(record.association_names().collect::<Vec<_>>(), vec!["employer"]);
}

#[test]
fn test_reads_are_private_copies() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[("name", Value::from("a"))]);

    let mut uow = engine.begin();
    uow.get_entity_state(&id).unwrap().set_property("name", "uncommitted");

    assert_eq!(stored(&engine, &id).property("name"), Some(&Value::from("a")));
    let mut other = engine.begin();
    assert_eq!(
        other.get_entity_state(&id).unwrap().property("name"),
        Some(&Value::from("a"))
    );
}

#[test]
fn test_iteration_sees_committed_records_only() {
    let engine = engine();
    create(&engine, &person("2"), &[]);
    create(&engine, &company("x"), &[]);
    create(&engine, &person("1"), &[]);

    let mut pending = engine.begin();
    pending.new_entity_state(&person("3")).unwrap();

    let ids: Vec<_> = engine
        .store()
        .iter()
        .map(|r| r.qualified_identity().clone())
        .collect();
    assert_eq!(ids, vec![company("x"), person("1"), person("2")]);
    assert_eq!(engine.store().count_by_type(&TypeTag::new("Person")), 2);
}
