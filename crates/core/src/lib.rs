//! Core types and traits for the entity store
//!
//! This crate defines the foundational types used throughout the system:
//! - Identity, TypeTag, QualifiedIdentity: entity addressing
//! - Value: property values
//! - Timestamp: commit times
//! - VersionedRecord: the unit of stored state
//! - EntitySchema, SchemaRegistry: per-type shape of new records
//! - Error: error taxonomy
//! - Traits: EntityStore, StateCommitter

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod record;
pub mod schema;
pub mod timestamp;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{StoreError, StoreResult};
pub use record::{
    EntityStatus, ManyAssociation, RecordStamp, VersionedRecord, INITIAL_VERSION,
    UNASSIGNED_INCARNATION,
};
pub use schema::{EntitySchema, ManyAssociationKind, SchemaRegistry};
pub use timestamp::Timestamp;
pub use traits::{EntityStore, StateBatch, StateCommitter};
pub use types::{Identity, QualifiedIdentity, TypeTag};
pub use value::Value;
