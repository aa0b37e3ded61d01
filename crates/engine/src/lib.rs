//! Entity store engine
//!
//! This crate wires the lower layers together:
//! - EntityStoreEngine: store + concurrency guard + configuration
//! - Unit-of-work id allocation
//! - StoreConfig: `entitystore.toml` loading
//!
//! The engine is the only component that reads configuration.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;

pub use database::{EntityStoreEngine, StoreConfig, CONFIG_FILE_NAME};
