//! Entity schemas and the type registry
//!
//! A [`SchemaRegistry`] maps each [`TypeTag`] to the [`EntitySchema`] that
//! declares its properties and associations. The registry is handed to the
//! store at construction; there is no process-wide registry.
//!
//! Schemas only shape new records: declared properties start out as
//! `Null`, associations unset, many- and named associations empty. Field
//! values are not validated.

use crate::error::{StoreError, StoreResult};
use crate::types::TypeTag;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Collection semantics of a many-association
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ManyAssociationKind {
    /// Ordered, duplicates allowed, positional insert
    #[default]
    List,
    /// Insertion-ordered, duplicates rejected
    Set,
    /// Unordered multiset, duplicates allowed, always appends
    Bag,
}

/// Declared shape of one entity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
    type_tag: TypeTag,
    properties: BTreeSet<String>,
    associations: BTreeSet<String>,
    many_associations: BTreeMap<String, ManyAssociationKind>,
    named_associations: BTreeSet<String>,
}

impl EntitySchema {
    /// Create an empty schema for a type
    pub fn new(type_tag: impl Into<TypeTag>) -> Self {
        Self {
            type_tag: type_tag.into(),
            properties: BTreeSet::new(),
            associations: BTreeSet::new(),
            many_associations: BTreeMap::new(),
            named_associations: BTreeSet::new(),
        }
    }

    /// Declare a property
    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.properties.insert(name.into());
        self
    }

    /// Declare a single-valued association
    pub fn with_association(mut self, name: impl Into<String>) -> Self {
        self.associations.insert(name.into());
        self
    }

    /// Declare a many-association of the given kind
    pub fn with_many_association(mut self, name: impl Into<String>, kind: ManyAssociationKind) -> Self {
        self.many_associations.insert(name.into(), kind);
        self
    }

    /// Declare a named association (key → entity map)
    pub fn with_named_association(mut self, name: impl Into<String>) -> Self {
        self.named_associations.insert(name.into());
        self
    }

    /// Type this schema describes
    pub fn type_tag(&self) -> &TypeTag {
        &self.type_tag
    }

    /// Declared property names
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(String::as_str)
    }

    /// Declared association names
    pub fn associations(&self) -> impl Iterator<Item = &str> {
        self.associations.iter().map(String::as_str)
    }

    /// Declared many-associations and their kinds
    pub fn many_associations(&self) -> impl Iterator<Item = (&str, ManyAssociationKind)> {
        self.many_associations
            .iter()
            .map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Declared named association names
    pub fn named_associations(&self) -> impl Iterator<Item = &str> {
        self.named_associations.iter().map(String::as_str)
    }

    /// Kind of a declared many-association
    pub fn many_association_kind(&self, name: &str) -> Option<ManyAssociationKind> {
        self.many_associations.get(name).copied()
    }
}

/// TypeTag → schema lookup
///
/// In open mode (the default) an unregistered type resolves to an empty
/// schema. In strict mode it fails with [`StoreError::UnknownEntityType`].
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: FxHashMap<TypeTag, Arc<EntitySchema>>,
    strict: bool,
}

impl SchemaRegistry {
    /// Create an open registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a strict registry
    pub fn strict() -> Self {
        Self {
            schemas: FxHashMap::default(),
            strict: true,
        }
    }

    /// Builder-style registration
    pub fn with_schema(mut self, schema: EntitySchema) -> Self {
        self.register(schema);
        self
    }

    /// Register (or replace) a schema
    pub fn register(&mut self, schema: EntitySchema) {
        self.schemas
            .insert(schema.type_tag().clone(), Arc::new(schema));
    }

    /// Switch strict mode on or off
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Whether unregistered types are rejected
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Registered schema for a type, if any
    pub fn get(&self, type_tag: &TypeTag) -> Option<Arc<EntitySchema>> {
        self.schemas.get(type_tag).cloned()
    }

    /// Check that a type is acceptable under the current mode
    pub fn ensure_known(&self, type_tag: &TypeTag) -> StoreResult<()> {
        if self.strict && !self.schemas.contains_key(type_tag) {
            return Err(StoreError::UnknownEntityType(type_tag.clone()));
        }
        Ok(())
    }

    /// Schema for a type, honouring strict mode
    pub fn resolve(&self, type_tag: &TypeTag) -> StoreResult<Arc<EntitySchema>> {
        match self.schemas.get(type_tag) {
            Some(schema) => Ok(Arc::clone(schema)),
            None if self.strict => Err(StoreError::UnknownEntityType(type_tag.clone())),
            None => Ok(Arc::new(EntitySchema::new(type_tag.clone()))),
        }
    }

    /// Registered type tags, sorted
    pub fn type_tags(&self) -> Vec<TypeTag> {
        let mut tags: Vec<_> = self.schemas.keys().cloned().collect();
        tags.sort();
        tags
    }

    /// Number of registered schemas
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Whether no schema is registered
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
