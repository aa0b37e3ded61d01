//! Store configuration via `entitystore.toml`
//!
//! Every key is optional; missing keys take their defaults. Unknown keys are
//! rejected so that a typo does not silently fall back to a default.

use entitystore_concurrency::DEFAULT_GUARD_CAPACITY;
use entitystore_core::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "entitystore.toml";

/// Store configuration loaded from `entitystore.toml`.
///
/// # Example
///
/// ```toml
/// guard_capacity = 10000
/// strict_types = false
/// check_unmodified_reads = false
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Maximum remembered versions in the concurrency guard; 0 disables caching.
    #[serde(default = "default_guard_capacity")]
    pub guard_capacity: usize,
    /// Reject entity types missing from the schema registry.
    #[serde(default)]
    pub strict_types: bool,
    /// Validate records that were read but not modified.
    #[serde(default)]
    pub check_unmodified_reads: bool,
}

fn default_guard_capacity() -> usize {
    DEFAULT_GUARD_CAPACITY
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            guard_capacity: default_guard_capacity(),
            strict_types: false,
            check_unmodified_reads: false,
        }
    }
}

impl StoreConfig {
    /// Set the guard capacity
    pub fn with_guard_capacity(mut self, capacity: usize) -> Self {
        self.guard_capacity = capacity;
        self
    }

    /// Switch strict type checking on or off
    pub fn with_strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    /// Switch validation of unmodified reads on or off
    pub fn with_check_unmodified_reads(mut self, enabled: bool) -> Self {
        self.check_unmodified_reads = enabled;
        self
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Entity store configuration
#
# Maximum number of read versions remembered by the concurrency guard.
# Oldest entries are evicted first; an evicted entry costs one extra store
# read at validation time. 0 disables the cache.
guard_capacity = 10000

# Reject entity types that are not registered in the schema registry.
strict_types = false

# Also validate records that were read but not modified before committing.
# When false, only records that will be written or removed are checked.
check_unmodified_reads = false
"#
    }

    /// Parse config from TOML text.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the text is not valid TOML or has unknown keys.
    pub fn from_toml_str(content: &str) -> StoreResult<Self> {
        toml::from_str(content)
            .map_err(|e| StoreError::invalid_input(format!("Failed to parse config: {}", e)))
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// `Storage` if the file cannot be read, `InvalidInput` if it cannot be parsed.
    pub fn from_file(path: &Path) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::storage(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&content).map_err(|e| {
            StoreError::invalid_input(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> StoreResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                StoreError::storage(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> StoreResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::storage(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            StoreError::storage(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
