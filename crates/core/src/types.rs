//! Identity types for the entity store
//!
//! This module defines the keys every record is stored under:
//! - Identity: opaque key, unique within one entity type
//! - TypeTag: names the logical entity type, the store's partition key
//! - QualifiedIdentity: (TypeTag, Identity), the true primary key

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of an entity within its type
///
/// Immutable once assigned. Two entities of different types may share the
/// same `Identity`; only the [`QualifiedIdentity`] is globally unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identity(String);

impl Identity {
    /// Create an identity from any string-like value
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identity as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Identity::new(s)
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Identity(s)
    }
}

/// Logical entity type name
///
/// Used as the outer partition key of the store. A TypeTag is a plain name,
/// not tied to any compiled type, so new entity types can be introduced by
/// registering a schema (see [`crate::schema::SchemaRegistry`]).
///
/// Ordering is lexicographic; the storage layer relies on it to acquire
/// partition locks in a deterministic order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(String);

impl TypeTag {
    /// Create a type tag
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the type name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(s: &str) -> Self {
        TypeTag::new(s)
    }
}

impl From<String> for TypeTag {
    fn from(s: String) -> Self {
        TypeTag(s)
    }
}

/// Composite primary key: (TypeTag, Identity)
///
/// Two qualified identities are equal iff both components are equal.
/// Ordering is by type tag first, then identity.
///
/// Displayed as `type:identity`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedIdentity {
    /// Entity type (partition)
    pub type_tag: TypeTag,
    /// Identity within the partition
    pub identity: Identity,
}

impl QualifiedIdentity {
    /// Create a qualified identity
    pub fn new(type_tag: impl Into<TypeTag>, identity: impl Into<Identity>) -> Self {
        Self {
            type_tag: type_tag.into(),
            identity: identity.into(),
        }
    }

    /// The type component
    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// The identity component
    pub fn identity(&self) -> &Identity {
        &self.identity
    }
}

impl fmt::Display for QualifiedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_tag, self.identity)
    }
}
