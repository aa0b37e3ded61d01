//! Storage layer for the entity store
//!
//! This crate implements the in-memory backend:
//! - TypePartitionedStore: one FxHashMap partition per entity type
//! - Per-partition RwLock (no cross-type contention)
//! - Two-phase writes: prepare, then commit or cancel
//! - Commit-time revalidation and undo-log rollback
//! - EntityStateIter: lazy iteration for maintenance
//!
//! The `testing` module carries fault injection for atomicity tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod partitioned;
pub mod testing;

pub use partitioned::{EntityStateIter, Partition, PreparedBatch, TypePartitionedStore};
