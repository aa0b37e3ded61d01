//! Unit of work: the transactional façade
//!
//! A [`UnitOfWork`] tracks private copies of the records it creates, reads
//! and removes. Nothing reaches the store until [`UnitOfWork::prepare`]
//! validates the copies with the [`ConcurrencyGuard`] and stages them, and
//! the returned [`UnitOfWorkCommitter`] commits.
//!
//! State transitions:
//! - `Active` → `Preparing` (prepare staged the batch)
//! - `Active` → `Cancelled` (conflict at prepare, or `discard`)
//! - `Preparing` → `Committed` (commit applied the batch)
//! - `Preparing` → `Cancelled` (cancel, commit failure, or committer dropped)
//!
//! Terminal states (no transitions allowed):
//! - `Committed`
//! - `Cancelled`
//!
//! No lock is held while a unit of work is `Active`, so an abandoned unit
//! of work cannot block anyone.

use crate::guard::ConcurrencyGuard;
use entitystore_core::{
    EntityStatus, EntityStore, QualifiedIdentity, StateBatch, StateCommitter, StoreError,
    StoreResult, VersionedRecord,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Status of a unit of work in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitOfWorkStatus {
    /// Reads and mutations allowed
    Active,
    /// Batch staged, waiting for commit or cancel
    Preparing,
    /// Batch applied
    Committed,
    /// Abandoned; the store was not changed
    Cancelled,
}

impl UnitOfWorkStatus {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitOfWorkStatus::Committed | UnitOfWorkStatus::Cancelled)
    }
}

/// Summary of what a commit would write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingOperations {
    /// Records to create
    pub news: usize,
    /// Loaded records to rewrite
    pub updates: usize,
    /// Records to delete
    pub removes: usize,
}

impl PendingOperations {
    /// Total number of pending operations
    pub fn total(&self) -> usize {
        self.news + self.updates + self.removes
    }

    /// Check if there are no pending operations
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Tracks record copies for one logical transaction
pub struct UnitOfWork {
    id: String,
    store: Arc<dyn EntityStore>,
    guard: Arc<ConcurrencyGuard>,
    states: BTreeMap<QualifiedIdentity, VersionedRecord>,
    status: Arc<Mutex<UnitOfWorkStatus>>,
    check_unmodified_reads: bool,
}

impl UnitOfWork {
    /// Start an `Active` unit of work
    pub fn new(id: impl Into<String>, store: Arc<dyn EntityStore>, guard: Arc<ConcurrencyGuard>) -> Self {
        let id = id.into();
        debug!(uow = %id, "unit of work created");
        Self {
            id,
            store,
            guard,
            states: BTreeMap::new(),
            status: Arc::new(Mutex::new(UnitOfWorkStatus::Active)),
            check_unmodified_reads: false,
        }
    }

    /// Also validate records that were read but not modified
    pub fn with_read_validation(mut self, enabled: bool) -> Self {
        self.check_unmodified_reads = enabled;
        self
    }

    /// Identifier used in logs
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle status
    pub fn status(&self) -> UnitOfWorkStatus {
        *self.status.lock()
    }

    /// Check if the unit of work accepts reads and mutations
    pub fn is_active(&self) -> bool {
        self.status() == UnitOfWorkStatus::Active
    }

    /// Fail with `InvalidState` unless `Active`
    pub fn ensure_active(&self) -> StoreResult<()> {
        let status = self.status();
        if status == UnitOfWorkStatus::Active {
            Ok(())
        } else {
            Err(StoreError::invalid_state(format!(
                "unit of work {} is not active: {:?}",
                self.id, status
            )))
        }
    }

    // === Record Operations ===

    /// Create a NEW record and track it
    ///
    /// # Errors
    ///
    /// `EntityAlreadyExists` if the identity is already tracked or stored.
    pub fn new_entity_state(&mut self, identity: &QualifiedIdentity) -> StoreResult<&mut VersionedRecord> {
        self.ensure_active()?;
        if self.states.contains_key(identity) {
            return Err(StoreError::EntityAlreadyExists(identity.clone()));
        }
        let record = self.store.new_entity_state(identity)?;
        Ok(self.states.entry(identity.clone()).or_insert(record))
    }

    /// Read a record into the unit of work
    ///
    /// A tracked record is returned as is. Otherwise a fresh copy is read
    /// from the store and its stamp remembered by the guard.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the record is not stored or was removed in this
    /// unit of work.
    pub fn get_entity_state(&mut self, identity: &QualifiedIdentity) -> StoreResult<&mut VersionedRecord> {
        self.ensure_active()?;
        if let Some(status) = self.states.get(identity).map(VersionedRecord::status) {
            if status == EntityStatus::Removed {
                return Err(StoreError::EntityNotFound(identity.clone()));
            }
        } else {
            let record = self.store.get_entity_state(identity)?;
            self.guard.remember(identity, record.stamp());
            self.states.insert(identity.clone(), record);
        }
        self.states
            .get_mut(identity)
            .ok_or_else(|| StoreError::EntityNotFound(identity.clone()))
    }

    /// Schedule a record for deletion
    ///
    /// A NEW record is simply forgotten. An untracked record is read first
    /// so that its version can be validated.
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the record is not stored or already removed.
    pub fn remove_entity_state(&mut self, identity: &QualifiedIdentity) -> StoreResult<()> {
        self.ensure_active()?;
        if self.states.get(identity).map(VersionedRecord::status) == Some(EntityStatus::New) {
            self.states.remove(identity);
            return Ok(());
        }
        self.get_entity_state(identity)?.mark_removed();
        Ok(())
    }

    /// Peek at a tracked record, including removed ones
    pub fn entity_state(&self, identity: &QualifiedIdentity) -> Option<&VersionedRecord> {
        self.states.get(identity)
    }

    /// Number of tracked records
    pub fn tracked_count(&self) -> usize {
        self.states.len()
    }

    /// What a commit would write right now
    pub fn pending_operations(&self) -> PendingOperations {
        let mut pending = PendingOperations::default();
        for record in self.states.values() {
            match record.status() {
                EntityStatus::New => pending.news += 1,
                EntityStatus::Loaded if record.is_modified() => pending.updates += 1,
                EntityStatus::Loaded => {}
                EntityStatus::Removed => pending.removes += 1,
            }
        }
        pending
    }

    // === Lifecycle ===

    /// Abandon the unit of work without touching the store or the guard
    pub fn discard(&mut self) -> StoreResult<()> {
        self.ensure_active()?;
        self.states.clear();
        *self.status.lock() = UnitOfWorkStatus::Cancelled;
        debug!(uow = %self.id, "unit of work discarded");
        Ok(())
    }

    /// Validate and stage every tracked record
    ///
    /// On success the unit of work is `Preparing` and the returned committer
    /// decides the outcome. On failure it is `Cancelled` and the store is
    /// untouched. Either way the guard forgets the versions this unit of
    /// work observed once the cycle completes.
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` listing every stale record, or any error
    /// raised by the store while staging.
    pub fn prepare(&mut self) -> StoreResult<UnitOfWorkCommitter> {
        self.ensure_active()?;

        let mut batch = StateBatch::new();
        for (_, record) in std::mem::take(&mut self.states) {
            match record.status() {
                EntityStatus::New => batch.new_states.push(record),
                EntityStatus::Loaded => batch.loaded_states.push(record),
                EntityStatus::Removed => batch.removed_states.push(record),
            }
        }
        let observed = batch.observed_identities();
        let pending = PendingOperations {
            news: batch.new_states.len(),
            updates: batch.updated_states().count(),
            removes: batch.removed_states.len(),
        };

        let check_all = self.check_unmodified_reads;
        let to_check = batch
            .loaded_states
            .iter()
            .filter(|record| check_all || record.needs_write())
            .chain(batch.removed_states.iter());
        if let Err(e) = self
            .guard
            .check_for_concurrent_modification(to_check, self.store.as_ref())
        {
            self.guard.forget_versions(&observed);
            *self.status.lock() = UnitOfWorkStatus::Cancelled;
            warn!(
                uow = %self.id,
                conflicts = e.conflicting_identities().len(),
                "prepare rejected"
            );
            return Err(e);
        }

        let committer = match self.store.prepare(batch) {
            Ok(committer) => committer,
            Err(e) => {
                self.guard.forget_versions(&observed);
                *self.status.lock() = UnitOfWorkStatus::Cancelled;
                debug!(uow = %self.id, error = %e, "prepare failed");
                return Err(e);
            }
        };

        *self.status.lock() = UnitOfWorkStatus::Preparing;
        debug!(
            uow = %self.id,
            news = pending.news,
            updates = pending.updates,
            removes = pending.removes,
            "unit of work prepared"
        );

        Ok(UnitOfWorkCommitter {
            uow: self.id.clone(),
            committer: Some(committer),
            guard: Arc::clone(&self.guard),
            observed,
            status: Arc::clone(&self.status),
        })
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("status", &self.status())
            .field("tracked", &self.states.len())
            .finish()
    }
}

/// Commit-or-cancel handle returned by [`UnitOfWork::prepare`]
///
/// Both outcomes make the guard forget the versions the unit of work
/// observed. Dropping the committer without deciding cancels it.
pub struct UnitOfWorkCommitter {
    uow: String,
    committer: Option<Box<dyn StateCommitter>>,
    guard: Arc<ConcurrencyGuard>,
    observed: Vec<QualifiedIdentity>,
    status: Arc<Mutex<UnitOfWorkStatus>>,
}

impl UnitOfWorkCommitter {
    /// Identifier of the unit of work this batch came from
    pub fn unit_of_work_id(&self) -> &str {
        &self.uow
    }

    /// Apply the batch
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` or `EntityAlreadyExists` if the store's
    /// commit-time recheck fails, or a storage error. The store is unchanged
    /// and the unit of work is `Cancelled` in every error case.
    pub fn commit(mut self) -> StoreResult<()> {
        let Some(committer) = self.committer.take() else {
            return Err(StoreError::invalid_state(format!(
                "unit of work {} already finished",
                self.uow
            )));
        };
        let result = committer.commit();
        self.guard.forget_versions(&self.observed);

        let mut status = self.status.lock();
        match &result {
            Ok(()) => {
                *status = UnitOfWorkStatus::Committed;
                debug!(uow = %self.uow, "unit of work committed");
            }
            Err(e) if e.is_conflict() => {
                *status = UnitOfWorkStatus::Cancelled;
                warn!(
                    uow = %self.uow,
                    conflicts = e.conflicting_identities().len(),
                    "commit rejected"
                );
            }
            Err(e) => {
                *status = UnitOfWorkStatus::Cancelled;
                debug!(uow = %self.uow, error = %e, "commit failed");
            }
        }
        result
    }

    /// Abort the batch; the store is not touched
    pub fn cancel(mut self) {
        self.abort("unit of work cancelled");
    }

    fn abort(&mut self, message: &'static str) {
        if let Some(committer) = self.committer.take() {
            committer.cancel();
            self.guard.forget_versions(&self.observed);
            *self.status.lock() = UnitOfWorkStatus::Cancelled;
            debug!(uow = %self.uow, "{}", message);
        }
    }
}

impl Drop for UnitOfWorkCommitter {
    fn drop(&mut self) {
        self.abort("prepared unit of work dropped");
    }
}

impl StateCommitter for UnitOfWorkCommitter {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        UnitOfWorkCommitter::commit(*self)
    }

    fn cancel(self: Box<Self>) {
        UnitOfWorkCommitter::cancel(*self)
    }
}

impl std::fmt::Debug for UnitOfWorkCommitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWorkCommitter")
            .field("uow", &self.uow)
            .field("pending", &self.committer.is_some())
            .field("observed", &self.observed.len())
            .finish()
    }
}
