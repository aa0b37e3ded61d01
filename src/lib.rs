//! Entitystore - in-memory, type-partitioned entity storage with
//! optimistic unit-of-work transactions
//!
//! Records are grouped into one partition per entity type. A unit of work
//! reads private copies, mutates them, and commits them as one batch; a
//! batch whose records changed underneath it is rejected with
//! [`StoreError::ConcurrentModification`] and nothing is written.
//!
//! # Quick Start
//!
//! ```ignore
//! use entitystore::{EntityStoreEngine, QualifiedIdentity, SchemaRegistry, StoreConfig};
//!
//! let engine = EntityStoreEngine::new(StoreConfig::default(), SchemaRegistry::new());
//! let id = QualifiedIdentity::new("Person", "alice");
//!
//! engine.unit_of_work(|uow| {
//!     uow.new_entity_state(&id)?.set_property("name", "Alice");
//!     Ok(())
//! })?;
//!
//! let mut uow = engine.begin();
//! uow.get_entity_state(&id)?.set_property("name", "Alicia");
//! uow.prepare()?.commit()?;
//! ```

pub use entitystore_concurrency::{
    ConcurrencyGuard, ConflictType, PendingOperations, UnitOfWork, UnitOfWorkCommitter,
    UnitOfWorkStatus, ValidationResult, DEFAULT_GUARD_CAPACITY,
};
pub use entitystore_core::{
    EntitySchema, EntityStatus, EntityStore, Identity, ManyAssociation, ManyAssociationKind,
    QualifiedIdentity, RecordStamp, SchemaRegistry, StateBatch, StateCommitter, StoreError,
    StoreResult, Timestamp, TypeTag, Value, VersionedRecord, INITIAL_VERSION,
    UNASSIGNED_INCARNATION,
};
pub use entitystore_engine::{EntityStoreEngine, StoreConfig, CONFIG_FILE_NAME};
pub use entitystore_storage::{EntityStateIter, PreparedBatch, TypePartitionedStore};

/// Fault injection for atomicity tests
pub mod testing {
    pub use entitystore_storage::testing::FaultPlan;
}
