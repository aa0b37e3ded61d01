//! Behavioural properties of the entity store, end to end through the engine
//!
//! ## Running These Tests
//!
//! ```bash
//! cargo test --test properties
//! ```

#[path = "../common/mod.rs"]
mod common;

mod conflict_detection;
mod delete_recreate;
mod monotonic_versioning;
mod noop_commit;
mod round_trip;
