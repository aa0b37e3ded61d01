//! Core traits for the entity store
//!
//! [`EntityStore`] is the seam between the unit of work and the storage
//! layer; [`StateCommitter`] is the second phase of a prepared write.

use crate::error::StoreResult;
use crate::record::{RecordStamp, VersionedRecord};
use crate::types::QualifiedIdentity;

/// The three record sets a unit of work hands to [`EntityStore::prepare`]
#[derive(Debug, Clone, Default)]
pub struct StateBatch {
    /// Records created in the unit of work
    pub new_states: Vec<VersionedRecord>,
    /// Records read in the unit of work (modified or not)
    pub loaded_states: Vec<VersionedRecord>,
    /// Records scheduled for deletion
    pub removed_states: Vec<VersionedRecord>,
}

impl StateBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether committing this batch would change nothing
    pub fn is_empty(&self) -> bool {
        self.new_states.is_empty()
            && self.removed_states.is_empty()
            && !self.loaded_states.iter().any(VersionedRecord::needs_write)
    }

    /// Loaded records that commit will rewrite
    pub fn updated_states(&self) -> impl Iterator<Item = &VersionedRecord> {
        self.loaded_states.iter().filter(|r| r.needs_write())
    }

    /// Identities of every loaded and removed record
    ///
    /// These are the identities a unit of work has version observations for.
    pub fn observed_identities(&self) -> Vec<QualifiedIdentity> {
        self.loaded_states
            .iter()
            .chain(self.removed_states.iter())
            .map(|r| r.qualified_identity().clone())
            .collect()
    }
}

/// Second phase of a prepared write
///
/// Both methods consume the committer, so a prepared batch is finalized or
/// aborted exactly once.
pub trait StateCommitter: Send {
    /// Apply the prepared batch atomically
    ///
    /// # Errors
    ///
    /// On error the store is left exactly as it was before the batch.
    fn commit(self: Box<Self>) -> StoreResult<()>;

    /// Abort the prepared batch; the store is not touched
    fn cancel(self: Box<Self>);
}

/// Storage abstraction used by units of work
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads.
pub trait EntityStore: Send + Sync {
    /// Create a NEW record for an identity that is not stored yet
    ///
    /// # Errors
    ///
    /// `EntityAlreadyExists` if the identity is present in its partition,
    /// `UnknownEntityType` if the type is rejected by a strict registry.
    fn new_entity_state(&self, identity: &QualifiedIdentity) -> StoreResult<VersionedRecord>;

    /// Read a fresh LOADED copy of a stored record
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the partition or the identity is absent.
    fn get_entity_state(&self, identity: &QualifiedIdentity) -> StoreResult<VersionedRecord>;

    /// Incarnation and version currently stored, without copying the record
    fn stored_stamp(&self, identity: &QualifiedIdentity) -> StoreResult<Option<RecordStamp>>;

    /// Stage a batch for a deferred commit
    ///
    /// Performs no staleness validation; that is the caller's job.
    fn prepare(&self, batch: StateBatch) -> StoreResult<Box<dyn StateCommitter>>;

    /// Every stored record, lazily
    fn entity_states(&self) -> Box<dyn Iterator<Item = VersionedRecord> + Send + '_>;
}
