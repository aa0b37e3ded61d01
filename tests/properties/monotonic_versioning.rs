//! Versions advance by exactly one per committed modification and never
//! move otherwise.

use crate::common::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Update(u8),
    ReadOnly(u8),
    Remove(u8),
}

fn op() -> impl Strategy<Value = Op> {
    let slot = 0u8..4;
    prop_oneof![
        slot.clone().prop_map(Op::Create),
        slot.clone().prop_map(Op::Update),
        slot.clone().prop_map(Op::ReadOnly),
        slot.prop_map(Op::Remove),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_versions_follow_model(ops in prop::collection::vec(op(), 1..40)) {
        let engine = engine();
        let mut model: BTreeMap<u8, u64> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Create(slot) => {
                    let id = person(&slot.to_string());
                    let result = engine.unit_of_work(|uow| {
                        uow.new_entity_state(&id)?.set_property("age", 0);
                        Ok(())
                    });
                    if model.contains_key(&slot) {
                        prop_assert_eq!(result, Err(StoreError::EntityAlreadyExists(id)));
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(slot, INITIAL_VERSION);
                    }
                }
                Op::Update(slot) => {
                    let id = person(&slot.to_string());
                    let result = set(&engine, &id, "age", slot as i64);
                    match model.get_mut(&slot) {
                        Some(version) => {
                            prop_assert!(result.is_ok());
                            *version += 1;
                        }
                        None => prop_assert_eq!(result, Err(StoreError::EntityNotFound(id))),
                    }
                }
                Op::ReadOnly(slot) => {
                    let id = person(&slot.to_string());
                    let result = engine.unit_of_work(|uow| uow.get_entity_state(&id).map(|_| ()));
                    prop_assert_eq!(result.is_ok(), model.contains_key(&slot));
                }
                Op::Remove(slot) => {
                    let id = person(&slot.to_string());
                    let result = remove(&engine, &id);
                    prop_assert_eq!(result.is_ok(), model.remove(&slot).is_some());
                }
            }

            for slot in 0u8..4 {
                let id = person(&slot.to_string());
                prop_assert_eq!(version_of(&engine, &id), model.get(&slot).copied());
            }
        }
    }
}

#[test]
fn test_each_modifying_commit_adds_one() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[]);

    let mut previous = version_of(&engine, &id).unwrap();
    for i in 0..10 {
        set(&engine, &id, "age", i).unwrap();
        let current = version_of(&engine, &id).unwrap();
        assert_eq!(current, previous + 1);
        previous = current;
    }
}

#[test]
fn test_multiple_mutations_in_one_unit_bump_once() {
    let engine = engine();
    let id = person("1");
    create(&engine, &id, &[]);

    engine
        .unit_of_work(|uow| {
            let record = uow.get_entity_state(&id)?;
            record.set_property("name", "a");
            record.set_property("name", "b");
            record.set_property("age", 3);
            Ok(())
        })
        .unwrap();

    assert_eq!(version_of(&engine, &id), Some(1));
}
