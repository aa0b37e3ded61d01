//! Concurrency layer for the entity store
//!
//! This crate implements optimistic concurrency control (OCC) with:
//! - ConcurrencyGuard: bounded cache of remembered read versions
//! - Staleness validation that reports every conflicting record
//! - UnitOfWork: private record copies, prepare, commit or cancel
//!
//! Conflicts are detected at prepare (against the guard) and again at
//! commit (by the store, under its partition locks).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod guard;
pub mod unit_of_work;
pub mod validation;

pub use guard::{ConcurrencyGuard, DEFAULT_GUARD_CAPACITY};
pub use unit_of_work::{PendingOperations, UnitOfWork, UnitOfWorkCommitter, UnitOfWorkStatus};
pub use validation::{ConflictType, ValidationResult};
