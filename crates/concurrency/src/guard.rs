//! Remembered-version cache for optimistic concurrency
//!
//! The [`ConcurrencyGuard`] remembers the stamp (incarnation and version)
//! each entity was last read at. Before a unit of work writes, the guard
//! compares the stamps its records carry against the remembered ones,
//! falling back to the store on a cache miss.
//!
//! # Rules
//!
//! - `remember` after every successful read (overwrites)
//! - `forget_versions` after every prepare/commit cycle, whatever the outcome
//! - A cache miss re-reads the stored version and does NOT remember it
//!
//! # Eviction
//!
//! The cache is bounded. When full, the oldest remembered entry is evicted
//! first (FIFO by insertion tick). Eviction only costs an extra store read
//! on the next check; it never changes the outcome. A capacity of 0
//! disables caching altogether.

use crate::validation::{ConflictType, ValidationResult};
use entitystore_core::{EntityStore, QualifiedIdentity, RecordStamp, StoreResult, VersionedRecord};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use tracing::{trace, warn};

/// Default maximum number of remembered versions
pub const DEFAULT_GUARD_CAPACITY: usize = 10_000;

#[derive(Debug)]
struct VersionCache {
    capacity: usize,
    /// identity → (stamp, tick of the write that set it)
    versions: FxHashMap<QualifiedIdentity, (RecordStamp, u64)>,
    /// Insertion order; entries whose tick no longer matches are stale
    order: VecDeque<(QualifiedIdentity, u64)>,
    next_tick: u64,
}

impl VersionCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            versions: FxHashMap::default(),
            order: VecDeque::new(),
            next_tick: 0,
        }
    }

    fn remember(&mut self, identity: &QualifiedIdentity, stamp: RecordStamp) {
        if self.capacity == 0 {
            return;
        }
        self.next_tick += 1;
        let tick = self.next_tick;
        self.versions.insert(identity.clone(), (stamp, tick));
        self.order.push_back((identity.clone(), tick));

        while self.versions.len() > self.capacity {
            let Some((oldest, tick)) = self.order.pop_front() else {
                break;
            };
            if self.versions.get(&oldest).map(|(_, t)| *t) == Some(tick) {
                self.versions.remove(&oldest);
                trace!(identity = %oldest, "evicted remembered version");
            }
        }

        // Overwrites and forgets leave stale order entries behind
        if self.order.len() > self.capacity.saturating_mul(2) {
            let versions = &self.versions;
            self.order
                .retain(|(id, tick)| versions.get(id).map(|(_, t)| t) == Some(tick));
        }
    }

    fn get(&self, identity: &QualifiedIdentity) -> Option<RecordStamp> {
        self.versions.get(identity).map(|(stamp, _)| *stamp)
    }

    fn forget(&mut self, identity: &QualifiedIdentity) {
        self.versions.remove(identity);
    }

    fn clear(&mut self) {
        self.versions.clear();
        self.order.clear();
    }
}

/// Detects records that were overwritten since they were read
#[derive(Debug)]
pub struct ConcurrencyGuard {
    cache: Mutex<VersionCache>,
}

impl ConcurrencyGuard {
    /// Create a guard remembering at most `capacity` versions
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: Mutex::new(VersionCache::new(capacity)),
        }
    }

    /// Maximum number of remembered versions
    pub fn capacity(&self) -> usize {
        self.cache.lock().capacity
    }

    /// Remember the stamp an entity was just read at
    pub fn remember(&self, identity: &QualifiedIdentity, stamp: RecordStamp) {
        self.cache.lock().remember(identity, stamp);
    }

    /// Drop remembered versions, forcing the next check to read the store
    pub fn forget_versions<'a, I>(&self, identities: I)
    where
        I: IntoIterator<Item = &'a QualifiedIdentity>,
    {
        let mut cache = self.cache.lock();
        for identity in identities {
            cache.forget(identity);
        }
    }

    /// Remembered stamp of an entity, if cached
    pub fn remembered_stamp(&self, identity: &QualifiedIdentity) -> Option<RecordStamp> {
        self.cache.lock().get(identity)
    }

    /// Remembered version of an entity, if cached
    pub fn remembered_version(&self, identity: &QualifiedIdentity) -> Option<u64> {
        self.remembered_stamp(identity).map(|stamp| stamp.version)
    }

    /// Collect every record whose version is stale
    ///
    /// Each record's version is compared against the remembered version, or
    /// on a miss against the stored stamp. A record absent from the store
    /// is stale.
    ///
    /// # Errors
    ///
    /// Only store read failures; conflicts are reported in the result.
    pub fn validate<'a, I>(&self, records: I, store: &dyn EntityStore) -> StoreResult<ValidationResult>
    where
        I: IntoIterator<Item = &'a VersionedRecord>,
    {
        let mut result = ValidationResult::ok();

        for record in records {
            let identity = record.qualified_identity();
            let remembered = self.remembered_stamp(identity);
            let current = match remembered {
                Some(stamp) => {
                    trace!(identity = %identity, %stamp, "guard hit");
                    Some(stamp)
                }
                None => {
                    trace!(identity = %identity, "guard miss");
                    store.stored_stamp(identity)?
                }
            };
            if let Some(conflict) = ConflictType::detect(identity, record.stamp(), current) {
                result.push(conflict);
            }
        }

        Ok(result)
    }

    /// Fail with `ConcurrentModification` listing every stale record
    pub fn check_for_concurrent_modification<'a, I>(
        &self,
        records: I,
        store: &dyn EntityStore,
    ) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'a VersionedRecord>,
    {
        let result = self.validate(records, store)?;
        if !result.is_valid() {
            warn!(conflicts = result.conflict_count(), "concurrent modification detected");
        }
        result.into_result()
    }

    /// Forget everything
    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    /// Number of remembered versions
    pub fn len(&self) -> usize {
        self.cache.lock().versions.len()
    }

    /// Whether nothing is remembered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConcurrencyGuard {
    fn default() -> Self {
        Self::new(DEFAULT_GUARD_CAPACITY)
    }
}
