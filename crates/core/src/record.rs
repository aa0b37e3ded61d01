//! Versioned entity records
//!
//! A [`VersionedRecord`] is the unit of stored state. Inside a unit of work
//! it is a private, mutable copy; the store only ever hands out copies.
//!
//! ## Modification tracking
//!
//! Every mutator that actually changes the record sets the modified flag.
//! Commit writes only records that are NEW or carry the flag, so a record
//! that was loaded and left alone keeps its version and timestamp.
//!
//! ## Lifecycle
//!
//! ```text
//! new_entity()  -> New     (version 0, no incarnation)
//! store read    -> Loaded  (stored version and incarnation)
//! mark_removed  -> Removed (excluded from reads, deleted on commit)
//! ```
//!
//! ## Incarnations
//!
//! Deleting an identity and creating it again restarts its version at 0.
//! The store therefore stamps every created record with a fresh
//! incarnation number, and staleness is judged on the [`RecordStamp`]
//! (incarnation plus version), never on the version alone.

use crate::schema::{EntitySchema, ManyAssociationKind};
use crate::timestamp::Timestamp;
use crate::types::QualifiedIdentity;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version assigned to a record the first time it is committed
pub const INITIAL_VERSION: u64 = 0;

/// Incarnation carried by a NEW record until the store assigns one
pub const UNASSIGNED_INCARNATION: u64 = 0;

/// Which stored state a record copy was taken from
///
/// Two copies with equal stamps were read from the same committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordStamp {
    /// Store-assigned number of the create that started this record's life
    pub incarnation: u64,
    /// Committed modifications since that create
    pub version: u64,
}

impl RecordStamp {
    /// Stamp from its parts
    pub fn new(incarnation: u64, version: u64) -> Self {
        Self {
            incarnation,
            version,
        }
    }
}

impl std::fmt::Display for RecordStamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.incarnation, self.version)
    }
}

/// Lifecycle state of a record within the current unit of work
///
/// Not persisted: everything the store returns is `Loaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityStatus {
    /// Created in this unit of work, not yet in the store
    New,
    /// Read from the store
    Loaded,
    /// Scheduled for deletion when the unit of work commits
    Removed,
}

/// Ordered references held by a many-association
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManyAssociation {
    kind: ManyAssociationKind,
    refs: Vec<QualifiedIdentity>,
}

impl ManyAssociation {
    /// Create an empty association of the given kind
    pub fn new(kind: ManyAssociationKind) -> Self {
        Self {
            kind,
            refs: Vec::new(),
        }
    }

    /// Collection semantics
    pub fn kind(&self) -> ManyAssociationKind {
        self.kind
    }

    /// Number of references
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether there are no references
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Whether `id` is referenced
    pub fn contains(&self, id: &QualifiedIdentity) -> bool {
        self.refs.contains(id)
    }

    /// References in order
    pub fn as_slice(&self) -> &[QualifiedIdentity] {
        &self.refs
    }

    /// Iterate references in order
    pub fn iter(&self) -> impl Iterator<Item = &QualifiedIdentity> {
        self.refs.iter()
    }

    /// Number of occurrences of `id`
    pub fn count_of(&self, id: &QualifiedIdentity) -> usize {
        self.refs.iter().filter(|r| *r == id).count()
    }

    /// Insert a reference; returns false if nothing changed
    ///
    /// `index` is clamped to the current length. `Bag` ignores it and appends.
    fn insert(&mut self, index: usize, id: QualifiedIdentity) -> bool {
        match self.kind {
            ManyAssociationKind::List => {
                let at = index.min(self.refs.len());
                self.refs.insert(at, id);
                true
            }
            ManyAssociationKind::Set => {
                if self.refs.contains(&id) {
                    return false;
                }
                let at = index.min(self.refs.len());
                self.refs.insert(at, id);
                true
            }
            ManyAssociationKind::Bag => {
                self.refs.push(id);
                true
            }
        }
    }

    /// Remove the first occurrence of a reference; returns false if absent
    fn remove(&mut self, id: &QualifiedIdentity) -> bool {
        match self.refs.iter().position(|r| r == id) {
            Some(pos) => {
                self.refs.remove(pos);
                true
            }
            None => false,
        }
    }
}

/// The unit of stored state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedRecord {
    identity: QualifiedIdentity,
    incarnation: u64,
    version: u64,
    last_modified: Timestamp,
    status: EntityStatus,
    properties: BTreeMap<String, Value>,
    associations: BTreeMap<String, Option<QualifiedIdentity>>,
    many_associations: BTreeMap<String, ManyAssociation>,
    named_associations: BTreeMap<String, BTreeMap<String, QualifiedIdentity>>,
    #[serde(skip)]
    modified: bool,
}

impl VersionedRecord {
    /// Create a NEW record shaped by `schema`
    ///
    /// Version starts at [`INITIAL_VERSION`]. Declared properties start out
    /// as [`Value::Null`], declared associations unset, and declared many- and
    /// named associations as empty collections.
    pub fn new_entity(identity: QualifiedIdentity, schema: &EntitySchema) -> Self {
        let properties = schema
            .properties()
            .map(|name| (name.to_string(), Value::Null))
            .collect();
        let associations = schema
            .associations()
            .map(|name| (name.to_string(), None))
            .collect();
        let many_associations = schema
            .many_associations()
            .map(|(name, kind)| (name.to_string(), ManyAssociation::new(kind)))
            .collect();
        let named_associations = schema
            .named_associations()
            .map(|name| (name.to_string(), BTreeMap::new()))
            .collect();

        Self {
            identity,
            incarnation: UNASSIGNED_INCARNATION,
            version: INITIAL_VERSION,
            last_modified: Timestamp::now(),
            status: EntityStatus::New,
            properties,
            associations,
            many_associations,
            named_associations,
            modified: false,
        }
    }

    // === Identity and metadata ===

    /// Primary key
    pub fn qualified_identity(&self) -> &QualifiedIdentity {
        &self.identity
    }

    /// Version observed when this copy was read (0 for NEW records)
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Store-assigned incarnation; [`UNASSIGNED_INCARNATION`] until created
    pub fn incarnation(&self) -> u64 {
        self.incarnation
    }

    /// Incarnation and version this copy was read at
    pub fn stamp(&self) -> RecordStamp {
        RecordStamp::new(self.incarnation, self.version)
    }

    /// Time of the commit that last wrote this record
    pub fn last_modified(&self) -> Timestamp {
        self.last_modified
    }

    /// Lifecycle state within the current unit of work
    pub fn status(&self) -> EntityStatus {
        self.status
    }

    /// Whether a mutator changed this record
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Whether commit has to write this record
    pub fn needs_write(&self) -> bool {
        match self.status {
            EntityStatus::New => true,
            EntityStatus::Loaded => self.modified,
            EntityStatus::Removed => false,
        }
    }

    // === Properties ===

    /// Property value
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Property names, sorted
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }

    /// Set a property
    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
        self.modified = true;
    }

    /// Remove a property, returning its previous value
    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        let previous = self.properties.remove(name);
        if previous.is_some() {
            self.modified = true;
        }
        previous
    }

    // === Associations ===

    /// Association target; `None` when unset or explicitly cleared
    pub fn association(&self, name: &str) -> Option<&QualifiedIdentity> {
        self.associations.get(name).and_then(Option::as_ref)
    }

    /// Association names (including cleared ones), sorted
    pub fn association_names(&self) -> impl Iterator<Item = &str> {
        self.associations.keys().map(String::as_str)
    }

    /// Point an association at an entity, or clear it with `None`
    pub fn set_association(&mut self, name: impl Into<String>, target: Option<QualifiedIdentity>) {
        self.associations.insert(name.into(), target);
        self.modified = true;
    }

    // === Many-associations ===

    /// Many-association by name
    pub fn many_association(&self, name: &str) -> Option<&ManyAssociation> {
        self.many_associations.get(name)
    }

    /// Many-association names, sorted
    pub fn many_association_names(&self) -> impl Iterator<Item = &str> {
        self.many_associations.keys().map(String::as_str)
    }

    /// Insert a reference into a many-association
    ///
    /// An undeclared association is created as a `List`. Returns false when
    /// the collection rejected the reference (duplicate in a `Set`); the
    /// modified flag is only set when something changed.
    pub fn add_many_association(&mut self, name: &str, index: usize, id: QualifiedIdentity) -> bool {
        let association = self
            .many_associations
            .entry(name.to_string())
            .or_insert_with(|| ManyAssociation::new(ManyAssociationKind::List));
        let changed = association.insert(index, id);
        if changed {
            self.modified = true;
        }
        changed
    }

    /// Remove a reference from a many-association; returns false if absent
    pub fn remove_many_association(&mut self, name: &str, id: &QualifiedIdentity) -> bool {
        let changed = self
            .many_associations
            .get_mut(name)
            .map(|association| association.remove(id))
            .unwrap_or(false);
        if changed {
            self.modified = true;
        }
        changed
    }

    // === Named associations ===

    /// Named association by name: key → target
    pub fn named_association(&self, name: &str) -> Option<&BTreeMap<String, QualifiedIdentity>> {
        self.named_associations.get(name)
    }

    /// Target stored under `key` in a named association
    pub fn named_association_target(&self, name: &str, key: &str) -> Option<&QualifiedIdentity> {
        self.named_associations.get(name).and_then(|refs| refs.get(key))
    }

    /// Named association names, sorted
    pub fn named_association_names(&self) -> impl Iterator<Item = &str> {
        self.named_associations.keys().map(String::as_str)
    }

    /// Point `key` of a named association at an entity
    ///
    /// Undeclared associations are created on first use. Returns false when
    /// `key` already pointed at `id`.
    pub fn put_named_association(
        &mut self,
        name: &str,
        key: impl Into<String>,
        id: QualifiedIdentity,
    ) -> bool {
        let previous = self
            .named_associations
            .entry(name.to_string())
            .or_default()
            .insert(key.into(), id.clone());
        let changed = previous.as_ref() != Some(&id);
        if changed {
            self.modified = true;
        }
        changed
    }

    /// Remove `key` from a named association, returning its target
    pub fn remove_named_association(&mut self, name: &str, key: &str) -> Option<QualifiedIdentity> {
        let removed = self
            .named_associations
            .get_mut(name)
            .and_then(|refs| refs.remove(key));
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    // === Lifecycle transitions ===

    /// Schedule this record for deletion
    pub fn mark_removed(&mut self) {
        self.status = EntityStatus::Removed;
    }

    /// Copy handed out by a store read: `Loaded`, unmodified
    pub fn to_loaded(&self) -> Self {
        let mut copy = self.clone();
        copy.status = EntityStatus::Loaded;
        copy.modified = false;
        copy
    }

    /// Form stored when a NEW record is first committed
    pub fn into_created(mut self, incarnation: u64, at: Timestamp) -> Self {
        self.incarnation = incarnation;
        self.into_committed(INITIAL_VERSION, at)
    }

    /// Form stored after a successful commit
    pub fn into_committed(mut self, version: u64, at: Timestamp) -> Self {
        self.version = version;
        self.last_modified = at;
        self.status = EntityStatus::Loaded;
        self.modified = false;
        self
    }
}
