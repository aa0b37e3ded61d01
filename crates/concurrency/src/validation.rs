//! Staleness validation for optimistic concurrency
//!
//! Key rules:
//! - A record is stale when the stamp it was read at differs from the
//!   stamp the guard (or the store) reports now
//! - A record deleted since it was read is stale, and so is one deleted
//!   and created again, even when the new incarnation is back at the same
//!   version number
//! - Every stale record is reported, not only the first one
//! - Blind creates are not validated here; the store rejects a NEW identity
//!   that already exists when the batch is applied

use entitystore_core::{QualifiedIdentity, RecordStamp, StoreError, StoreResult};

/// Types of conflicts found during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Record was read at one version but a different version is current
    StaleVersion {
        /// The conflicting entity
        identity: QualifiedIdentity,
        /// Version carried by the unit of work's copy
        read_version: u64,
        /// Version remembered by the guard or stored now
        current_version: u64,
    },

    /// Record was read but no longer exists
    Deleted {
        /// The conflicting entity
        identity: QualifiedIdentity,
        /// Version carried by the unit of work's copy
        read_version: u64,
    },

    /// Record was deleted and created again since it was read
    Recreated {
        /// The conflicting entity
        identity: QualifiedIdentity,
        /// Stamp carried by the unit of work's copy
        read: RecordStamp,
        /// Stamp of the new incarnation
        current: RecordStamp,
    },
}

impl ConflictType {
    /// The conflicting entity
    pub fn identity(&self) -> &QualifiedIdentity {
        match self {
            ConflictType::StaleVersion { identity, .. } => identity,
            ConflictType::Deleted { identity, .. } => identity,
            ConflictType::Recreated { identity, .. } => identity,
        }
    }

    /// Compare a read stamp against the current one
    ///
    /// Returns `None` when they agree.
    pub fn detect(
        identity: &QualifiedIdentity,
        read: RecordStamp,
        current: Option<RecordStamp>,
    ) -> Option<Self> {
        match current {
            Some(current) if current == read => None,
            Some(current) if current.incarnation != read.incarnation => {
                Some(ConflictType::Recreated {
                    identity: identity.clone(),
                    read,
                    current,
                })
            }
            Some(current) => Some(ConflictType::StaleVersion {
                identity: identity.clone(),
                read_version: read.version,
                current_version: current.version,
            }),
            None => Some(ConflictType::Deleted {
                identity: identity.clone(),
                read_version: read.version,
            }),
        }
    }
}

/// Result of validating a set of records
///
/// Accumulates all conflicts found. A batch proceeds only if
/// `is_valid()` returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Record a conflict
    pub fn push(&mut self, conflict: ConflictType) {
        self.conflicts.push(conflict);
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Identities of every conflicting entity
    pub fn identities(&self) -> Vec<QualifiedIdentity> {
        self.conflicts
            .iter()
            .map(|c| c.identity().clone())
            .collect()
    }

    /// Convert into `Err(ConcurrentModification)` when any conflict was found
    pub fn into_result(self) -> StoreResult<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(StoreError::concurrent_modification(self.identities()))
        }
    }
}
