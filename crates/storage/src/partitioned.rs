//! Type-partitioned in-memory entity storage
//!
//! One partition per [`TypeTag`], each an FxHashMap from [`Identity`] to
//! [`VersionedRecord`] behind its own RwLock.
//!
//! # Design
//!
//! - Outer map lock: only taken for writing when a partition is created
//! - Partition lock: taken for record-level get/put/remove
//! - Different types never contend
//!
//! # Commit
//!
//! A prepared batch is applied by [`PreparedBatch::commit`]:
//!
//! 1. Write-lock every touched partition, in sorted TypeTag order
//! 2. Revalidate NEW identities (still absent) and stored stamps
//! 3. Apply removals, then inserts, then updates, recording an undo log
//! 4. On any failure, replay the undo log backwards and release the locks
//!
//! Locks are taken in one global order, so concurrent commits over
//! overlapping partitions cannot deadlock.
//!
//! # Versions
//!
//! NEW records are stored at [`entitystore_core::INITIAL_VERSION`] under a fresh incarnation
//! drawn from a per-store counter; a modified LOADED record is stored at its
//! read version plus one and keeps its incarnation. Revalidation compares
//! the whole [`RecordStamp`], so a copy of a deleted record never matches
//! a recreated one. Every record written by one commit shares a single
//! timestamp.

use entitystore_core::{
    EntityStore, Identity, QualifiedIdentity, RecordStamp, SchemaRegistry, StateBatch,
    StateCommitter, StoreError, StoreResult, Timestamp, TypeTag, VersionedRecord,
    UNASSIGNED_INCARNATION,
};
use parking_lot::{RwLock, RwLockWriteGuard};
use rustc_hash::FxHashMap;
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::testing::FaultPlan;

/// Records of one entity type
#[derive(Debug, Default)]
pub struct Partition {
    records: FxHashMap<Identity, VersionedRecord>,
}

impl Partition {
    /// Create an empty partition
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the partition holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stored record for an identity
    pub fn get(&self, identity: &Identity) -> Option<&VersionedRecord> {
        self.records.get(identity)
    }

    /// Whether an identity is stored
    pub fn contains(&self, identity: &Identity) -> bool {
        self.records.contains_key(identity)
    }

    /// Stored version for an identity
    pub fn version(&self, identity: &Identity) -> Option<u64> {
        self.records.get(identity).map(VersionedRecord::version)
    }

    /// Stored incarnation and version for an identity
    pub fn stamp(&self, identity: &Identity) -> Option<RecordStamp> {
        self.records.get(identity).map(VersionedRecord::stamp)
    }

    /// Copies of every record, sorted by identity
    pub fn snapshot(&self) -> Vec<VersionedRecord> {
        let mut records: Vec<_> = self.records.values().map(VersionedRecord::to_loaded).collect();
        records.sort_by(|a, b| a.qualified_identity().cmp(b.qualified_identity()));
        records
    }

    fn insert(&mut self, record: VersionedRecord) -> Option<VersionedRecord> {
        let identity = record.qualified_identity().identity().clone();
        self.records.insert(identity, record)
    }

    fn remove(&mut self, identity: &Identity) -> Option<VersionedRecord> {
        self.records.remove(identity)
    }
}

type PartitionRef = Arc<RwLock<Partition>>;

struct StoreInner {
    /// TypeTag → partition; write-locked only to create partitions
    partitions: RwLock<FxHashMap<TypeTag, PartitionRef>>,
    registry: SchemaRegistry,
    faults: FaultPlan,
    /// Last incarnation handed to a created record
    last_incarnation: AtomicU64,
}

impl StoreInner {
    fn next_incarnation(&self) -> u64 {
        self.last_incarnation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn partition(&self, type_tag: &TypeTag) -> Option<PartitionRef> {
        self.partitions.read().get(type_tag).cloned()
    }

    fn partition_or_create(&self, type_tag: &TypeTag) -> PartitionRef {
        if let Some(partition) = self.partition(type_tag) {
            return partition;
        }
        let mut partitions = self.partitions.write();
        let partition = partitions.entry(type_tag.clone()).or_insert_with(|| {
            trace!(type_tag = %type_tag, "created partition");
            PartitionRef::default()
        });
        Arc::clone(partition)
    }

    /// Partitions sorted by TypeTag
    fn sorted_partitions(&self) -> Vec<(TypeTag, PartitionRef)> {
        let mut partitions: Vec<_> = self
            .partitions
            .read()
            .iter()
            .map(|(tag, partition)| (tag.clone(), Arc::clone(partition)))
            .collect();
        partitions.sort_by(|a, b| a.0.cmp(&b.0));
        partitions
    }
}

/// In-memory entity store, partitioned by entity type
///
/// Cloning is cheap and yields a handle to the same store.
///
/// # Thread Safety
///
/// All operations are thread-safe:
/// - `get()`: read-locks one partition
/// - `commit()`: write-locks only the partitions its batch touches
/// - No lock is held while caller code runs
#[derive(Clone)]
pub struct TypePartitionedStore {
    inner: Arc<StoreInner>,
}

impl TypePartitionedStore {
    /// Create an empty store
    pub fn new(registry: SchemaRegistry) -> Self {
        Self::with_fault_plan(registry, FaultPlan::none())
    }

    /// Create an empty store whose commits consult `faults`
    pub fn with_fault_plan(registry: SchemaRegistry, faults: FaultPlan) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                partitions: RwLock::new(FxHashMap::default()),
                registry,
                faults,
                last_incarnation: AtomicU64::new(UNASSIGNED_INCARNATION),
            }),
        }
    }

    /// Schema registry this store was built with
    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    /// Fault plan consulted by commits
    pub fn fault_plan(&self) -> &FaultPlan {
        &self.inner.faults
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    /// Read a LOADED copy of a stored record
    ///
    /// # Errors
    ///
    /// `EntityNotFound` if the type partition does not exist or the identity
    /// is absent within it.
    pub fn get(&self, identity: &QualifiedIdentity) -> StoreResult<VersionedRecord> {
        let not_found = || StoreError::EntityNotFound(identity.clone());
        let partition = self.inner.partition(identity.type_tag()).ok_or_else(not_found)?;
        let records = partition.read();
        records
            .get(identity.identity())
            .map(VersionedRecord::to_loaded)
            .ok_or_else(not_found)
    }

    /// Whether an identity is stored
    pub fn contains(&self, identity: &QualifiedIdentity) -> bool {
        self.inner
            .partition(identity.type_tag())
            .map(|partition| partition.read().contains(identity.identity()))
            .unwrap_or(false)
    }

    /// Currently stored version of an identity
    pub fn stored_version(&self, identity: &QualifiedIdentity) -> Option<u64> {
        self.inner
            .partition(identity.type_tag())
            .and_then(|partition| partition.read().version(identity.identity()))
    }

    /// Currently stored incarnation and version of an identity
    pub fn stored_stamp(&self, identity: &QualifiedIdentity) -> Option<RecordStamp> {
        self.inner
            .partition(identity.type_tag())
            .and_then(|partition| partition.read().stamp(identity.identity()))
    }

    /// Create a NEW record for an identity that is not stored yet
    ///
    /// # Errors
    ///
    /// `EntityAlreadyExists` if the identity is stored,
    /// `UnknownEntityType` if a strict registry rejects the type.
    pub fn new_entity_state(&self, identity: &QualifiedIdentity) -> StoreResult<VersionedRecord> {
        let schema = self.inner.registry.resolve(identity.type_tag())?;
        if self.contains(identity) {
            return Err(StoreError::EntityAlreadyExists(identity.clone()));
        }
        Ok(VersionedRecord::new_entity(identity.clone(), &schema))
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Stage a batch for a deferred commit
    ///
    /// Performs no staleness validation. Unmodified loaded records are
    /// dropped from the batch here.
    ///
    /// # Errors
    ///
    /// `UnknownEntityType` if a strict registry rejects a record's type.
    pub fn prepare(&self, batch: StateBatch) -> StoreResult<PreparedBatch> {
        let StateBatch {
            new_states,
            loaded_states,
            removed_states,
        } = batch;

        for record in new_states
            .iter()
            .chain(loaded_states.iter())
            .chain(removed_states.iter())
        {
            self.inner
                .registry
                .ensure_known(record.qualified_identity().type_tag())?;
        }

        let updates: Vec<_> = loaded_states
            .into_iter()
            .filter(|record| record.needs_write())
            .collect();

        Ok(PreparedBatch {
            inner: Arc::clone(&self.inner),
            news: new_states,
            updates,
            removes: removed_states,
        })
    }

    // ========================================================================
    // Maintenance Operations
    // ========================================================================

    /// Lazy iteration over every stored record
    ///
    /// The partition list is captured now; each partition is copied when the
    /// iterator reaches it. Records come out sorted by type, then identity.
    pub fn iter(&self) -> EntityStateIter {
        EntityStateIter {
            pending: self
                .inner
                .sorted_partitions()
                .into_iter()
                .map(|(_, partition)| partition)
                .collect(),
            current: Vec::new().into_iter(),
        }
    }

    /// Call `visitor` on every stored record until it returns false
    ///
    /// Returns the number of records visited. No lock is held while the
    /// visitor runs.
    pub fn visit_entity_states<F>(&self, mut visitor: F) -> usize
    where
        F: FnMut(&VersionedRecord) -> bool,
    {
        let mut visited = 0;
        for record in self.iter() {
            visited += 1;
            if !visitor(&record) {
                break;
            }
        }
        visited
    }

    /// Total number of stored records
    pub fn count(&self) -> usize {
        self.inner
            .sorted_partitions()
            .iter()
            .map(|(_, partition)| partition.read().len())
            .sum()
    }

    /// Number of stored records of one type
    pub fn count_by_type(&self, type_tag: &TypeTag) -> usize {
        self.inner
            .partition(type_tag)
            .map(|partition| partition.read().len())
            .unwrap_or(0)
    }

    /// Types with at least one stored record, sorted
    pub fn type_tags(&self) -> Vec<TypeTag> {
        self.inner
            .sorted_partitions()
            .into_iter()
            .filter(|(_, partition)| !partition.read().is_empty())
            .map(|(tag, _)| tag)
            .collect()
    }

    /// Number of partitions, including empty ones
    pub fn partition_count(&self) -> usize {
        self.inner.partitions.read().len()
    }
}

impl Default for TypePartitionedStore {
    fn default() -> Self {
        Self::new(SchemaRegistry::new())
    }
}

impl std::fmt::Debug for TypePartitionedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypePartitionedStore")
            .field("partition_count", &self.partition_count())
            .field("count", &self.count())
            .field("strict_types", &self.inner.registry.is_strict())
            .finish()
    }
}

impl EntityStore for TypePartitionedStore {
    fn new_entity_state(&self, identity: &QualifiedIdentity) -> StoreResult<VersionedRecord> {
        TypePartitionedStore::new_entity_state(self, identity)
    }

    fn get_entity_state(&self, identity: &QualifiedIdentity) -> StoreResult<VersionedRecord> {
        self.get(identity)
    }

    fn stored_stamp(&self, identity: &QualifiedIdentity) -> StoreResult<Option<RecordStamp>> {
        Ok(TypePartitionedStore::stored_stamp(self, identity))
    }

    fn prepare(&self, batch: StateBatch) -> StoreResult<Box<dyn StateCommitter>> {
        Ok(Box::new(TypePartitionedStore::prepare(self, batch)?))
    }

    fn entity_states(&self) -> Box<dyn Iterator<Item = VersionedRecord> + Send + '_> {
        Box::new(self.iter())
    }
}

// ============================================================================
// Iteration
// ============================================================================

/// Lazy iterator over stored records, see [`TypePartitionedStore::iter`]
pub struct EntityStateIter {
    pending: VecDeque<PartitionRef>,
    current: std::vec::IntoIter<VersionedRecord>,
}

impl Iterator for EntityStateIter {
    type Item = VersionedRecord;

    fn next(&mut self) -> Option<VersionedRecord> {
        loop {
            if let Some(record) = self.current.next() {
                return Some(record);
            }
            let partition = self.pending.pop_front()?;
            self.current = partition.read().snapshot().into_iter();
        }
    }
}

// ============================================================================
// Prepared Batch
// ============================================================================

/// A staged batch awaiting commit or cancel
pub struct PreparedBatch {
    inner: Arc<StoreInner>,
    news: Vec<VersionedRecord>,
    updates: Vec<VersionedRecord>,
    removes: Vec<VersionedRecord>,
}

enum StepKind {
    Remove(Identity),
    Write(VersionedRecord),
}

struct Step {
    slot: usize,
    kind: StepKind,
}

enum Undo {
    Restore { slot: usize, record: VersionedRecord },
    Discard { slot: usize, identity: Identity },
}

impl PreparedBatch {
    /// Number of NEW records
    pub fn new_count(&self) -> usize {
        self.news.len()
    }

    /// Number of modified LOADED records
    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// Number of removals
    pub fn remove_count(&self) -> usize {
        self.removes.len()
    }

    /// Whether committing would change nothing
    pub fn is_empty(&self) -> bool {
        self.news.is_empty() && self.updates.is_empty() && self.removes.is_empty()
    }

    /// Lock set for this batch, sorted by TypeTag
    ///
    /// Partitions receiving writes are created if missing. A partition that
    /// only sees removals is skipped when it does not exist.
    fn lock_set(&self) -> Vec<(TypeTag, PartitionRef)> {
        let write_tags: BTreeSet<&TypeTag> = self
            .news
            .iter()
            .chain(self.updates.iter())
            .map(|r| r.qualified_identity().type_tag())
            .collect();
        let remove_tags: BTreeSet<&TypeTag> = self
            .removes
            .iter()
            .map(|r| r.qualified_identity().type_tag())
            .collect();

        let mut handles: Vec<(TypeTag, PartitionRef)> = write_tags
            .iter()
            .map(|tag| ((*tag).clone(), self.inner.partition_or_create(tag)))
            .collect();
        for tag in remove_tags.difference(&write_tags) {
            if let Some(partition) = self.inner.partition(tag) {
                handles.push(((*tag).clone(), partition));
            }
        }
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    fn apply(self) -> StoreResult<()> {
        if self.is_empty() {
            return Ok(());
        }

        let handles = self.lock_set();
        let mut guards: Vec<RwLockWriteGuard<'_, Partition>> =
            handles.iter().map(|(_, partition)| partition.write()).collect();
        let slot_of = |tag: &TypeTag| handles.binary_search_by(|(t, _)| t.cmp(tag)).ok();

        let timestamp = Timestamp::now();
        let news = self.news.len();
        let updates = self.updates.len();
        let removes = self.removes.len();
        let mut steps = Vec::with_capacity(news + updates + removes);
        let mut conflicts = Vec::new();

        for record in self.removes {
            let id = record.qualified_identity();
            let Some(slot) = slot_of(id.type_tag()) else {
                continue;
            };
            match guards[slot].stamp(id.identity()) {
                None => {}
                Some(stored) if stored == record.stamp() => steps.push(Step {
                    slot,
                    kind: StepKind::Remove(id.identity().clone()),
                }),
                Some(_) => conflicts.push(id.clone()),
            }
        }

        for record in self.news {
            let id = record.qualified_identity();
            let slot = slot_of(id.type_tag()).ok_or_else(|| {
                StoreError::storage(format!("no partition locked for {}", id))
            })?;
            if guards[slot].contains(id.identity()) {
                return Err(StoreError::EntityAlreadyExists(id.clone()));
            }
            steps.push(Step {
                slot,
                kind: StepKind::Write(
                    record.into_created(self.inner.next_incarnation(), timestamp),
                ),
            });
        }

        for record in self.updates {
            let id = record.qualified_identity();
            let slot = slot_of(id.type_tag()).ok_or_else(|| {
                StoreError::storage(format!("no partition locked for {}", id))
            })?;
            if guards[slot].stamp(id.identity()) != Some(record.stamp()) {
                conflicts.push(id.clone());
                continue;
            }
            let next = record.version() + 1;
            steps.push(Step {
                slot,
                kind: StepKind::Write(record.into_committed(next, timestamp)),
            });
        }

        if !conflicts.is_empty() {
            debug!(conflicts = conflicts.len(), "commit rejected by revalidation");
            return Err(StoreError::concurrent_modification(conflicts));
        }

        let mut undo = Vec::with_capacity(steps.len());
        for (index, step) in steps.into_iter().enumerate() {
            if let Err(e) = self.inner.faults.before_step(index + 1) {
                debug!(step = index + 1, undone = undo.len(), "rolling back batch");
                rollback(&mut guards, undo);
                return Err(e);
            }
            let partition = &mut guards[step.slot];
            match step.kind {
                StepKind::Remove(identity) => {
                    if let Some(record) = partition.remove(&identity) {
                        undo.push(Undo::Restore {
                            slot: step.slot,
                            record,
                        });
                    }
                }
                StepKind::Write(record) => {
                    let identity = record.qualified_identity().identity().clone();
                    match partition.insert(record) {
                        Some(previous) => undo.push(Undo::Restore {
                            slot: step.slot,
                            record: previous,
                        }),
                        None => undo.push(Undo::Discard {
                            slot: step.slot,
                            identity,
                        }),
                    }
                }
            }
        }

        trace!(news, updates, removes, %timestamp, "batch applied");
        Ok(())
    }
}

fn rollback(guards: &mut [RwLockWriteGuard<'_, Partition>], undo: Vec<Undo>) {
    for entry in undo.into_iter().rev() {
        match entry {
            Undo::Restore { slot, record } => {
                guards[slot].insert(record);
            }
            Undo::Discard { slot, identity } => {
                guards[slot].remove(&identity);
            }
        }
    }
}

impl StateCommitter for PreparedBatch {
    fn commit(self: Box<Self>) -> StoreResult<()> {
        (*self).apply()
    }

    fn cancel(self: Box<Self>) {
        trace!(
            news = self.news.len(),
            updates = self.updates.len(),
            removes = self.removes.len(),
            "batch cancelled"
        );
    }
}

impl std::fmt::Debug for PreparedBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedBatch")
            .field("news", &self.news.len())
            .field("updates", &self.updates.len())
            .field("removes", &self.removes.len())
            .finish()
    }
}
