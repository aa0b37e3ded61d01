//! Error types for the entity store
//!
//! One error enum covers every failure the store, the concurrency guard and
//! the unit of work can raise. We use `thiserror` for automatic `Display`
//! and `Error` trait implementations.
//!
//! ## Recoverability
//!
//! | Variant | Recoverable | Caller action |
//! |---------|-------------|---------------|
//! | `EntityNotFound` | yes | treat as "does not exist yet" |
//! | `EntityAlreadyExists` | yes | load the entity instead of creating it |
//! | `ConcurrentModification` | yes | reload the listed entities and retry |
//! | `UnknownEntityType` | no | abort the unit of work |
//! | `Storage` | no | abort the unit of work |
//! | `InvalidState` | no | programming error |
//! | `InvalidInput` | no | fix the input |

use crate::types::{QualifiedIdentity, TypeTag};
use thiserror::Error;

/// Result type alias for entity store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Error types for the entity store
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Requested entity is absent from its partition (or the partition does not exist)
    #[error("entity not found: {0}")]
    EntityNotFound(QualifiedIdentity),

    /// Attempted creation collides with an existing entity
    #[error("entity already exists: {0}")]
    EntityAlreadyExists(QualifiedIdentity),

    /// Batch rejected because the listed entities changed since they were read
    #[error("concurrent modification of {}", describe_conflict(.identities))]
    ConcurrentModification {
        /// Every entity whose stored version no longer matches the one read
        identities: Vec<QualifiedIdentity>,
    },

    /// Entity type is not registered in a strict schema registry
    #[error("unknown entity type: {0}")]
    UnknownEntityType(TypeTag),

    /// Lower-level storage failure
    #[error("entity store error: {message}")]
    Storage {
        /// Description of the failure
        message: String,
    },

    /// Operation is not legal in the current unit-of-work state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed input, e.g. an unreadable configuration
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

fn describe_conflict(identities: &[QualifiedIdentity]) -> String {
    let noun = if identities.len() == 1 { "entity" } else { "entities" };
    let listed = identities
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{} {}: {}", identities.len(), noun, listed)
}

impl StoreError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        StoreError::Storage {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        StoreError::InvalidState(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        StoreError::InvalidInput(message.into())
    }

    /// Create a concurrent modification error
    ///
    /// Identities are sorted so the error is deterministic regardless of
    /// the order in which conflicts were discovered.
    pub fn concurrent_modification(mut identities: Vec<QualifiedIdentity>) -> Self {
        identities.sort();
        identities.dedup();
        StoreError::ConcurrentModification { identities }
    }

    /// Whether the caller can recover by reloading and retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StoreError::EntityNotFound(_)
                | StoreError::EntityAlreadyExists(_)
                | StoreError::ConcurrentModification { .. }
        )
    }

    /// Whether this is a staleness rejection
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::ConcurrentModification { .. })
    }

    /// Entities that caused a concurrent modification rejection
    ///
    /// Empty for every other variant.
    pub fn conflicting_identities(&self) -> &[QualifiedIdentity] {
        match self {
            StoreError::ConcurrentModification { identities } => identities,
            _ => &[],
        }
    }
}
