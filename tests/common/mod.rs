//! Shared test utilities for the root integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use entitystore::testing::FaultPlan;
pub use entitystore::*;

// ============================================================================
// Engines
// ============================================================================

/// Schema used across suites: people with friends, contacts and an employer
pub fn registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .with_schema(
            EntitySchema::new("Person")
                .with_property("name")
                .with_property("age")
                .with_association("employer")
                .with_many_association("friends", ManyAssociationKind::Set)
                .with_many_association("visits", ManyAssociationKind::List)
                .with_named_association("contacts"),
        )
        .with_schema(EntitySchema::new("Company").with_property("name"))
}

pub fn engine() -> EntityStoreEngine {
    EntityStoreEngine::new(StoreConfig::default(), registry())
}

pub fn engine_with(config: StoreConfig) -> EntityStoreEngine {
    EntityStoreEngine::new(config, registry())
}

pub fn faulty_engine(plan: FaultPlan) -> EntityStoreEngine {
    EntityStoreEngine::with_fault_plan(StoreConfig::default(), registry(), plan)
}

// ============================================================================
// Identities and records
// ============================================================================

pub fn person(id: &str) -> QualifiedIdentity {
    QualifiedIdentity::new("Person", id)
}

pub fn company(id: &str) -> QualifiedIdentity {
    QualifiedIdentity::new("Company", id)
}

/// Create a record with the given properties in its own unit of work
pub fn create(engine: &EntityStoreEngine, id: &QualifiedIdentity, props: &[(&str, Value)]) {
    engine
        .unit_of_work(|uow| {
            let record = uow.new_entity_state(id)?;
            for (name, value) in props {
                record.set_property(*name, value.clone());
            }
            Ok(())
        })
        .unwrap();
}

/// Set one property in its own unit of work
pub fn set(engine: &EntityStoreEngine, id: &QualifiedIdentity, name: &str, value: impl Into<Value>) -> StoreResult<()> {
    let value = value.into();
    engine.unit_of_work(|uow| {
        uow.get_entity_state(id)?.set_property(name, value);
        Ok(())
    })
}

/// Remove a record in its own unit of work
pub fn remove(engine: &EntityStoreEngine, id: &QualifiedIdentity) -> StoreResult<()> {
    engine.unit_of_work(|uow| uow.remove_entity_state(id))
}

pub fn stored(engine: &EntityStoreEngine, id: &QualifiedIdentity) -> VersionedRecord {
    engine.store().get(id).unwrap()
}

pub fn version_of(engine: &EntityStoreEngine, id: &QualifiedIdentity) -> Option<u64> {
    engine.store().stored_version(id)
}

/// Every stored record, for before/after comparisons
pub fn snapshot(engine: &EntityStoreEngine) -> Vec<VersionedRecord> {
    engine.store().iter().collect()
}
