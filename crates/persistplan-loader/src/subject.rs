//! Subjects: the loader's in-flight view of one entity.
//!
//! A subject pairs the entity the caller wants to save (if any) with the row
//! previously stored for it (if any). At least one of the two is always
//! present.

use persistplan_core::{
    Entity, EntityGraph, EntityId, EntityMetadata, IdentityKey, MetadataRegistry, Row, Value,
};
use std::sync::Arc;

/// Position of a subject inside its [`SubjectCollection`](crate::SubjectCollection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(pub(crate) usize);

impl SubjectId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// How a subject is told apart from others of the same entity type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubjectIdentity {
    /// Primary key values.
    Key(IdentityKey),
    /// Never stored: identified by its place in the entity graph.
    Instance(EntityId),
}

/// Deduplication key: entity type + identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectKey {
    entity: &'static str,
    identity: SubjectIdentity,
}

impl SubjectKey {
    /// Key for an entity with known primary key values.
    #[must_use]
    pub fn for_identifier(entity: &'static str, identifier: &[Value]) -> Self {
        Self {
            entity,
            identity: SubjectIdentity::Key(IdentityKey::new(identifier)),
        }
    }

    /// Key for an entity that has no identifier yet.
    #[must_use]
    pub fn for_instance(entity: &'static str, id: EntityId) -> Self {
        Self {
            entity,
            identity: SubjectIdentity::Instance(id),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &'static str {
        self.entity
    }

    #[must_use]
    pub fn identity(&self) -> &SubjectIdentity {
        &self.identity
    }
}

/// What the write stage will do with a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectOperation {
    Insert,
    Update,
    Remove,
    /// Loaded but unchanged.
    None,
}

/// One entity under consideration.
#[derive(Debug, Clone)]
pub struct Subject {
    metadata: Arc<EntityMetadata>,
    /// The in-memory entity handed in by the caller.
    entity: Option<EntityId>,
    /// Previously stored state, with relation-id projection.
    database_entity: Option<Row>,
    /// Primary key used to fetch `database_entity`.
    identifier: Option<Vec<Value>>,
    marked_for_removal: bool,
}

impl Subject {
    /// Subject for an entity of `graph`.
    ///
    /// Returns `None` when `id` does not exist in the graph.
    #[must_use]
    pub fn from_entity(
        metadata: Arc<EntityMetadata>,
        graph: &EntityGraph,
        id: EntityId,
    ) -> Option<Self> {
        let entity = graph.get(id)?;
        let identifier = entity.primary_key_value(&metadata);
        Some(Self {
            metadata,
            entity: Some(id),
            database_entity: None,
            identifier,
            marked_for_removal: false,
        })
    }

    /// Subject discovered only through storage.
    ///
    /// Returns `None` when `row` carries no usable primary key.
    #[must_use]
    pub fn from_database(metadata: Arc<EntityMetadata>, row: Row) -> Option<Self> {
        let identifier = row.key_values(metadata.primary_key)?;
        Some(Self {
            metadata,
            entity: None,
            database_entity: Some(row),
            identifier: Some(identifier),
            marked_for_removal: false,
        })
    }

    /// Deduplication key of this subject.
    #[must_use]
    pub fn key(&self) -> SubjectKey {
        match (&self.identifier, self.entity) {
            (Some(identifier), _) => SubjectKey::for_identifier(self.metadata.name, identifier),
            (None, Some(id)) => SubjectKey::for_instance(self.metadata.name, id),
            // Constructors guarantee an identifier or an entity.
            (None, None) => SubjectKey::for_identifier(self.metadata.name, &[]),
        }
    }

    #[must_use]
    pub fn entity_name(&self) -> &'static str {
        self.metadata.name
    }

    #[must_use]
    pub fn metadata(&self) -> &Arc<EntityMetadata> {
        &self.metadata
    }

    #[must_use]
    pub fn entity(&self) -> Option<EntityId> {
        self.entity
    }

    /// Resolve the persisted entity in `graph`.
    #[must_use]
    pub fn persisted<'g>(&self, graph: &'g EntityGraph) -> Option<&'g Entity> {
        graph.get(self.entity?)
    }

    #[must_use]
    pub fn database_entity(&self) -> Option<&Row> {
        self.database_entity.as_ref()
    }

    #[must_use]
    pub fn has_database_entity(&self) -> bool {
        self.database_entity.is_some()
    }

    #[must_use]
    pub fn identifier(&self) -> Option<&[Value]> {
        self.identifier.as_deref()
    }

    #[must_use]
    pub fn is_marked_for_removal(&self) -> bool {
        self.marked_for_removal
    }

    pub fn set_database_entity(&mut self, row: Row) {
        self.database_entity = Some(row);
    }

    pub fn mark_for_removal(&mut self) {
        self.marked_for_removal = true;
    }

    /// Fill in whatever `other` knows that this subject does not.
    pub(crate) fn merge(&mut self, other: Subject) {
        if self.entity.is_none() {
            self.entity = other.entity;
        }
        if self.database_entity.is_none() {
            self.database_entity = other.database_entity;
        }
        if self.identifier.is_none() {
            self.identifier = other.identifier;
        }
        self.marked_for_removal |= other.marked_for_removal;
    }

    /// Columns whose persisted value differs from the stored row.
    ///
    /// Owner-side relations that are not `Unset` contribute their join column
    /// when the referenced identifier differs from the stored foreign key.
    /// Without a stored row every persisted column counts as changed.
    #[must_use]
    pub fn changed_columns(
        &self,
        graph: &EntityGraph,
        registry: &MetadataRegistry,
    ) -> Vec<&'static str> {
        let Some(entity) = self.persisted(graph) else {
            return Vec::new();
        };
        let Some(row) = &self.database_entity else {
            return entity.columns().map(|(name, _)| name).collect();
        };

        let mut changed: Vec<&'static str> = entity
            .columns()
            .filter(|(name, value)| {
                row.get_by_name(name)
                    .is_none_or(|stored| !value.same_identity(stored))
            })
            .map(|(name, _)| name)
            .collect();

        for relation in self
            .metadata
            .relations
            .iter()
            .filter(|r| r.kind.is_owner_side())
        {
            let Some(local_key) = relation.local_key else {
                continue;
            };
            if changed.contains(&local_key) {
                continue;
            }
            let persisted = entity.relation(relation.name);
            if persisted.is_unset() {
                continue;
            }
            let Some(target) = registry.get(relation.target) else {
                continue;
            };
            let persisted_fk = persisted
                .ids()
                .first()
                .and_then(|id| graph.get(*id))
                .and_then(|related| related.primary_key_value(target))
                .and_then(|mut key| (key.len() == 1).then(|| key.remove(0)))
                .unwrap_or(Value::Null);
            let stored_fk = relation
                .own_relation_id(row)
                .cloned()
                .unwrap_or(Value::Null);
            if !persisted_fk.same_identity(&stored_fk) {
                changed.push(local_key);
            }
        }
        changed
    }

    /// Classify this subject for the write stage.
    #[must_use]
    pub fn operation(&self, graph: &EntityGraph, registry: &MetadataRegistry) -> SubjectOperation {
        if self.marked_for_removal {
            return SubjectOperation::Remove;
        }
        match (self.entity.is_some(), self.database_entity.is_some()) {
            (true, false) => SubjectOperation::Insert,
            (true, true) if !self.changed_columns(graph, registry).is_empty() => {
                SubjectOperation::Update
            }
            _ => SubjectOperation::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistplan_core::{Cascade, RelationInfo, RelationValue};

    fn post_entity_metadata() -> EntityMetadata {
        EntityMetadata::new("Post", "posts")
            .primary_key(&["id"])
            .relation(
                RelationInfo::many_to_one("category", "Category", "category_id")
                    .cascade(Cascade::ALL),
            )
    }

    fn post_metadata() -> Arc<EntityMetadata> {
        Arc::new(post_entity_metadata())
    }

    fn registry() -> MetadataRegistry {
        MetadataRegistry::new()
            .with(post_entity_metadata())
            .with(EntityMetadata::new("Category", "categories").primary_key(&["id"]))
    }

    #[test]
    fn new_entity_is_keyed_by_instance() {
        let mut graph = EntityGraph::new();
        let post = graph.insert(Entity::new("Post").with("title", "draft"));
        let subject = Subject::from_entity(post_metadata(), &graph, post).unwrap();

        assert_eq!(subject.identifier(), None);
        assert_eq!(subject.key(), SubjectKey::for_instance("Post", post));
        assert_eq!(subject.operation(&graph, &registry()), SubjectOperation::Insert);
    }

    #[test]
    fn stored_entity_is_keyed_by_identifier() {
        let mut graph = EntityGraph::new();
        let post = graph.insert(Entity::new("Post").with("id", 1_i64));
        let from_entity = Subject::from_entity(post_metadata(), &graph, post).unwrap();
        let from_row = Subject::from_database(
            post_metadata(),
            Row::from_pairs([("id", Value::Int(1))]),
        )
        .unwrap();

        assert_eq!(from_entity.key(), from_row.key());
    }

    #[test]
    fn unknown_entity_or_keyless_row_yields_no_subject() {
        let graph = EntityGraph::new();
        let mut other = EntityGraph::new();
        let dangling = other.insert(Entity::new("Post"));
        assert!(Subject::from_entity(post_metadata(), &graph, dangling).is_none());
        assert!(
            Subject::from_database(post_metadata(), Row::from_pairs([("id", Value::Null)]))
                .is_none()
        );
    }

    #[test]
    fn merge_fills_missing_state() {
        let mut graph = EntityGraph::new();
        let post = graph.insert(Entity::new("Post").with("id", 1_i64));
        let mut subject = Subject::from_entity(post_metadata(), &graph, post).unwrap();
        let mut stored = Subject::from_database(
            post_metadata(),
            Row::from_pairs([("id", Value::BigInt(1))]),
        )
        .unwrap();
        stored.mark_for_removal();

        subject.merge(stored);
        assert!(subject.has_database_entity());
        assert_eq!(subject.entity(), Some(post));
        assert!(subject.is_marked_for_removal());
        assert_eq!(subject.operation(&graph, &registry()), SubjectOperation::Remove);
    }

    #[test]
    fn changed_columns_compare_against_stored_row() {
        let mut graph = EntityGraph::new();
        let category = graph.insert(Entity::new("Category").with("id", 6_i64));
        let post = graph.insert(
            Entity::new("Post")
                .with("id", 1_i64)
                .with("title", "new title")
                .with("views", 3_i64)
                .with_relation("category", RelationValue::One(category)),
        );
        let mut subject = Subject::from_entity(post_metadata(), &graph, post).unwrap();
        subject.set_database_entity(Row::from_pairs([
            ("id", Value::Int(1)),
            ("title", Value::Text("old title".into())),
            ("views", Value::Int(3)),
            ("category_id", Value::BigInt(5)),
        ]));

        assert_eq!(
            subject.changed_columns(&graph, &registry()),
            vec!["title", "category_id"]
        );
        assert_eq!(subject.operation(&graph, &registry()), SubjectOperation::Update);
    }

    #[test]
    fn unchanged_subject_needs_no_write() {
        let mut graph = EntityGraph::new();
        let post = graph.insert(Entity::new("Post").with("id", 1_i64).with("title", "same"));
        let mut subject = Subject::from_entity(post_metadata(), &graph, post).unwrap();
        subject.set_database_entity(Row::from_pairs([
            ("id", Value::BigInt(1)),
            ("title", Value::Text("same".into())),
            ("category_id", Value::BigInt(5)),
        ]));

        assert!(subject.changed_columns(&graph, &registry()).is_empty());
        assert_eq!(subject.operation(&graph, &registry()), SubjectOperation::None);
    }
}
