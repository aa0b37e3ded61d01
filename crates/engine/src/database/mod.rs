//! Engine struct wiring store, guard and configuration
//!
//! The [`EntityStoreEngine`] owns one [`TypePartitionedStore`] and one
//! [`ConcurrencyGuard`] and hands out units of work bound to both.
//!
//! ## Unit-of-work API
//!
//! 1. **Closure API**: `engine.unit_of_work(|uow| { ... })`
//!    - Prepare and commit on `Ok`, discard on `Err`
//!    - Conflicts are returned, never retried
//!
//! 2. **Manual API**: `begin()` + `prepare()` + `commit()`/`cancel()`
//!    - For callers that decide the outcome after preparing, e.g. to
//!      commit several stores together

pub mod config;

pub use config::{StoreConfig, CONFIG_FILE_NAME};

use entitystore_concurrency::{ConcurrencyGuard, UnitOfWork};
use entitystore_core::{EntityStore, SchemaRegistry, StoreResult};
use entitystore_storage::testing::FaultPlan;
use entitystore_storage::TypePartitionedStore;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Entity store engine
///
/// Thread-safe; share it behind an `Arc` and call [`begin`](Self::begin)
/// from any thread.
pub struct EntityStoreEngine {
    instance: Uuid,
    next_unit_of_work: AtomicU64,
    store: Arc<TypePartitionedStore>,
    guard: Arc<ConcurrencyGuard>,
    config: StoreConfig,
}

impl EntityStoreEngine {
    /// Create an engine with an empty store
    ///
    /// `config.strict_types` switches the registry to strict mode; a registry
    /// that is already strict stays strict.
    pub fn new(config: StoreConfig, registry: SchemaRegistry) -> Self {
        Self::with_fault_plan(config, registry, FaultPlan::none())
    }

    /// Create an engine whose store commits consult `faults`
    pub fn with_fault_plan(config: StoreConfig, mut registry: SchemaRegistry, faults: FaultPlan) -> Self {
        if config.strict_types {
            registry.set_strict(true);
        }
        let instance = Uuid::new_v4();
        info!(
            %instance,
            guard_capacity = config.guard_capacity,
            strict_types = registry.is_strict(),
            check_unmodified_reads = config.check_unmodified_reads,
            "entity store engine created"
        );
        Self {
            instance,
            next_unit_of_work: AtomicU64::new(0),
            store: Arc::new(TypePartitionedStore::with_fault_plan(registry, faults)),
            guard: Arc::new(ConcurrencyGuard::new(config.guard_capacity)),
            config,
        }
    }

    /// Create an engine configured from a TOML file
    ///
    /// The file is created with default contents if it does not exist.
    pub fn open(config_path: &Path, registry: SchemaRegistry) -> StoreResult<Self> {
        StoreConfig::write_default_if_missing(config_path)?;
        let config = StoreConfig::from_file(config_path)?;
        Ok(Self::new(config, registry))
    }

    /// Identifier of this engine instance
    pub fn instance_id(&self) -> Uuid {
        self.instance
    }

    /// Active configuration
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The backing store
    pub fn store(&self) -> &TypePartitionedStore {
        &self.store
    }

    /// The concurrency guard shared by every unit of work
    pub fn guard(&self) -> &Arc<ConcurrencyGuard> {
        &self.guard
    }

    /// Allocate a unit-of-work id: `<instance uuid>-<counter>`
    fn next_id(&self) -> String {
        let n = self.next_unit_of_work.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{}", self.instance, n)
    }

    /// Start a new `Active` unit of work
    pub fn begin(&self) -> UnitOfWork {
        let store: Arc<dyn EntityStore> = Arc::clone(&self.store) as Arc<dyn EntityStore>;
        UnitOfWork::new(self.next_id(), store, Arc::clone(&self.guard))
            .with_read_validation(self.config.check_unmodified_reads)
    }

    /// Run `f` in a unit of work, then prepare and commit it
    ///
    /// If `f` fails the unit of work is discarded and the error returned.
    /// A conflict at prepare or commit is returned as is; callers that want
    /// to retry reload and run again.
    pub fn unit_of_work<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut UnitOfWork) -> StoreResult<T>,
    {
        let mut uow = self.begin();
        match f(&mut uow) {
            Ok(value) => {
                uow.prepare()?.commit()?;
                Ok(value)
            }
            Err(e) => {
                if uow.is_active() {
                    uow.discard()?;
                }
                debug!(uow = uow.id(), error = %e, "unit of work abandoned");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for EntityStoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStoreEngine")
            .field("instance", &self.instance)
            .field("config", &self.config)
            .field("store", &self.store)
            .field("remembered_versions", &self.guard.len())
            .finish()
    }
}
