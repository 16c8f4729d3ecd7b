//! In-memory entities about to be persisted.
//!
//! Entities live in an [`EntityGraph`] arena and refer to each other through
//! [`EntityId`] handles, so shared and cyclic references are plain data.
//!
//! A relation property has three distinct states that must never be
//! conflated:
//!
//! - [`RelationValue::Unset`]: the caller did not touch the relation
//! - [`RelationValue::Null`]: the caller explicitly cleared it
//! - [`RelationValue::One`] / [`RelationValue::Many`]: the relation is set

use crate::metadata::EntityMetadata;
use crate::value::Value;
use std::collections::HashMap;

/// Handle of an entity inside an [`EntityGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(usize);

impl EntityId {
    /// Position of the entity in its graph.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// State of one relation property on an in-memory entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RelationValue {
    /// Untouched. Removal detection skips the relation entirely.
    #[default]
    Unset,
    /// Explicitly cleared.
    Null,
    /// Singular relation pointing at an entity in the same graph.
    One(EntityId),
    /// Collection relation.
    Many(Vec<EntityId>),
}

impl RelationValue {
    /// Handles referenced by this value, in declaration order.
    pub fn ids(&self) -> &[EntityId] {
        match self {
            RelationValue::One(id) => std::slice::from_ref(id),
            RelationValue::Many(ids) => ids,
            RelationValue::Unset | RelationValue::Null => &[],
        }
    }

    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, RelationValue::Unset)
    }
}

/// One in-memory entity: plain columns plus relation properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    target: &'static str,
    columns: Vec<(&'static str, Value)>,
    relations: HashMap<&'static str, RelationValue>,
}

static UNSET: RelationValue = RelationValue::Unset;

impl Entity {
    /// Create an entity of the named type with no columns set.
    #[must_use]
    pub fn new(target: &'static str) -> Self {
        Self {
            target,
            columns: Vec::new(),
            relations: HashMap::new(),
        }
    }

    /// Builder form of [`Entity::set`].
    #[must_use]
    pub fn with(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    /// Builder form of [`Entity::set_relation`].
    #[must_use]
    pub fn with_relation(mut self, name: &'static str, value: RelationValue) -> Self {
        self.set_relation(name, value);
        self
    }

    /// Name of the entity type.
    #[must_use]
    pub fn target(&self) -> &'static str {
        self.target
    }

    /// Set a plain column, replacing any previous value.
    pub fn set(&mut self, column: &'static str, value: impl Into<Value>) {
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.columns.push((column, value)),
        }
    }

    /// Get a plain column value.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, v)| v)
    }

    /// Iterate over set columns in assignment order.
    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.columns.iter().map(|(name, v)| (*name, v))
    }

    /// Set a relation property.
    pub fn set_relation(&mut self, name: &'static str, value: RelationValue) {
        self.relations.insert(name, value);
    }

    /// Forget a relation property, returning it to [`RelationValue::Unset`].
    pub fn unset_relation(&mut self, name: &str) {
        self.relations.remove(name);
    }

    /// Get a relation property; absent properties read as `Unset`.
    #[must_use]
    pub fn relation(&self, name: &str) -> &RelationValue {
        self.relations.get(name).unwrap_or(&UNSET)
    }

    /// Primary key values, or `None` when any key column is missing or NULL
    /// (the entity has never been stored).
    #[must_use]
    pub fn primary_key_value(&self, metadata: &EntityMetadata) -> Option<Vec<Value>> {
        if metadata.primary_key.is_empty() {
            return None;
        }
        metadata
            .primary_key
            .iter()
            .map(|col| self.get(col).filter(|v| !v.is_null()).cloned())
            .collect()
    }
}

/// Arena of entities forming the object graph handed to the loader.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    nodes: Vec<Entity>,
}

impl EntityGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entity, returning its handle.
    pub fn insert(&mut self, entity: Entity) -> EntityId {
        self.nodes.push(entity);
        EntityId(self.nodes.len() - 1)
    }

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.nodes.get(id.0)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.nodes.get_mut(id.0)
    }

    /// Point `from.relation` at `to`. Returns `false` if `from` is unknown.
    pub fn link(&mut self, from: EntityId, relation: &'static str, to: EntityId) -> bool {
        match self.nodes.get_mut(from.0) {
            Some(entity) => {
                entity.set_relation(relation, RelationValue::One(to));
                true
            }
            None => false,
        }
    }

    /// Append `to` to the collection relation `from.relation`.
    ///
    /// An `Unset` or `Null` collection becomes a one-element collection.
    pub fn push_to(&mut self, from: EntityId, relation: &'static str, to: EntityId) -> bool {
        let Some(entity) = self.nodes.get_mut(from.0) else {
            return false;
        };
        let mut ids = entity.relation(relation).ids().to_vec();
        ids.push(to);
        entity.set_relation(relation, RelationValue::Many(ids));
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
