//! Insertion-ordered, identity-deduplicated set of subjects.
//!
//! The collection is the loader's visited-set: every (entity type,
//! identity) pair maps to exactly one [`Subject`], no matter how many
//! relation paths reach it.

use crate::subject::{Subject, SubjectId, SubjectKey, SubjectOperation};
use persistplan_core::{
    Entity, EntityGraph, EntityId, EntityMetadata, MetadataRegistry, Value,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Subjects of one entity type that have an identifier to fetch by.
#[derive(Debug, Clone)]
pub struct SubjectGroup {
    pub metadata: Arc<EntityMetadata>,
    /// Identifiers in insertion order.
    pub identifiers: Vec<Vec<Value>>,
}

/// Count of pending write operations by type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PendingCounts {
    /// Subjects pending INSERT.
    pub inserts: usize,
    /// Subjects pending UPDATE.
    pub updates: usize,
    /// Subjects pending DELETE.
    pub removals: usize,
}

impl PendingCounts {
    /// Total number of pending operations.
    #[must_use]
    pub fn total(&self) -> usize {
        self.inserts + self.updates + self.removals
    }

    /// Check if there are no pending operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubjectCollection {
    subjects: Vec<Subject>,
    index: HashMap<SubjectKey, SubjectId>,
}

impl SubjectCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `subject` unconditionally.
    ///
    /// Identity lookups keep resolving to the first subject pushed under a
    /// given key.
    pub fn push(&mut self, subject: Subject) -> SubjectId {
        let id = SubjectId(self.subjects.len());
        self.index.entry(subject.key()).or_insert(id);
        self.subjects.push(subject);
        id
    }

    /// Append `subject` unless one with the same key already exists.
    ///
    /// Returns the id of the stored subject and whether it was newly added.
    /// When a subject already exists, the state `subject` carries is merged
    /// into it instead of creating a duplicate.
    pub fn push_if_not_exist(&mut self, subject: Subject) -> (SubjectId, bool) {
        let key = subject.key();
        if let Some(&existing) = self.index.get(&key) {
            self.subjects[existing.0].merge(subject);
            return (existing, false);
        }
        let id = SubjectId(self.subjects.len());
        self.index.insert(key, id);
        self.subjects.push(subject);
        (id, true)
    }

    /// First subject matching `predicate`.
    pub fn find<P>(&self, mut predicate: P) -> Option<&Subject>
    where
        P: FnMut(&Subject) -> bool,
    {
        self.subjects.iter().find(|s| predicate(s))
    }

    #[must_use]
    pub fn find_by_key(&self, key: &SubjectKey) -> Option<SubjectId> {
        self.index.get(key).copied()
    }

    /// Subject of type `entity` with the given primary key values.
    #[must_use]
    pub fn find_by_identifier(&self, entity: &'static str, identifier: &[Value]) -> Option<SubjectId> {
        self.find_by_key(&SubjectKey::for_identifier(entity, identifier))
    }

    /// Subject tracking `sample`, compared by primary key.
    ///
    /// Entities that were never stored carry no primary key and match
    /// nothing; look those up with [`SubjectCollection::find_by_instance`].
    #[must_use]
    pub fn find_by_entity_like(&self, metadata: &EntityMetadata, sample: &Entity) -> Option<SubjectId> {
        let identifier = sample.primary_key_value(metadata)?;
        self.find_by_identifier(metadata.name, &identifier)
    }

    /// Subject created for the graph entity `id`.
    #[must_use]
    pub fn find_by_instance(&self, entity: &'static str, id: EntityId) -> Option<SubjectId> {
        self.find_by_key(&SubjectKey::for_instance(entity, id)).or_else(|| {
            self.iter()
                .find(|(_, s)| s.entity_name() == entity && s.entity() == Some(id))
                .map(|(sid, _)| sid)
        })
    }

    /// Partition subjects with an identifier into one group per entity type.
    ///
    /// Groups appear in the order their type was first collected, so the
    /// resulting fetches are deterministic.
    #[must_use]
    pub fn group_by_entity_targets(&self) -> Vec<SubjectGroup> {
        let mut groups: Vec<SubjectGroup> = Vec::new();
        let mut by_name: HashMap<&'static str, usize> = HashMap::new();

        for subject in &self.subjects {
            let Some(identifier) = subject.identifier() else {
                continue;
            };
            let slot = *by_name.entry(subject.entity_name()).or_insert_with(|| {
                groups.push(SubjectGroup {
                    metadata: Arc::clone(subject.metadata()),
                    identifiers: Vec::new(),
                });
                groups.len() - 1
            });
            groups[slot].identifiers.push(identifier.to_vec());
        }
        groups
    }

    #[must_use]
    pub fn get(&self, id: SubjectId) -> Option<&Subject> {
        self.subjects.get(id.0)
    }

    pub fn get_mut(&mut self, id: SubjectId) -> Option<&mut Subject> {
        self.subjects.get_mut(id.0)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (SubjectId, &Subject)> {
        self.subjects
            .iter()
            .enumerate()
            .map(|(i, s)| (SubjectId(i), s))
    }

    /// Subjects marked for removal, in insertion order.
    pub fn removed(&self) -> impl Iterator<Item = &Subject> {
        self.subjects.iter().filter(|s| s.is_marked_for_removal())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Tally what the write stage will have to do.
    #[must_use]
    pub fn pending_counts(&self, graph: &EntityGraph, registry: &MetadataRegistry) -> PendingCounts {
        let mut counts = PendingCounts::default();
        for subject in &self.subjects {
            match subject.operation(graph, registry) {
                SubjectOperation::Insert => counts.inserts += 1,
                SubjectOperation::Update => counts.updates += 1,
                SubjectOperation::Remove => counts.removals += 1,
                SubjectOperation::None => {}
            }
        }
        counts
    }

    pub(crate) fn into_subjects(self) -> Vec<Subject> {
        self.subjects
    }
}

impl IntoIterator for SubjectCollection {
    type Item = Subject;
    type IntoIter = std::vec::IntoIter<Subject>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_subjects().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use persistplan_core::Row;

    fn meta(name: &'static str) -> Arc<EntityMetadata> {
        Arc::new(EntityMetadata::new(name, name).primary_key(&["id"]))
    }

    fn graph_with(entities: &[(&'static str, Option<i64>)]) -> (EntityGraph, Vec<EntityId>) {
        let mut graph = EntityGraph::new();
        let ids = entities
            .iter()
            .map(|&(name, id)| {
                let mut e = Entity::new(name);
                if let Some(id) = id {
                    e.set("id", id);
                }
                graph.insert(e)
            })
            .collect();
        (graph, ids)
    }

    #[test]
    fn push_if_not_exist_deduplicates_by_type_and_identifier() {
        let (graph, ids) = graph_with(&[("Post", Some(1)), ("Post", Some(1)), ("Category", Some(1))]);
        let mut subjects = SubjectCollection::new();

        let (a, added_a) = subjects
            .push_if_not_exist(Subject::from_entity(meta("Post"), &graph, ids[0]).unwrap());
        let (b, added_b) = subjects
            .push_if_not_exist(Subject::from_entity(meta("Post"), &graph, ids[1]).unwrap());
        let (c, added_c) = subjects
            .push_if_not_exist(Subject::from_entity(meta("Category"), &graph, ids[2]).unwrap());

        assert!(added_a && !added_b && added_c);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(subjects.len(), 2);
        // First instance wins
        assert_eq!(subjects.get(a).unwrap().entity(), Some(ids[0]));
    }

    #[test]
    fn push_if_not_exist_merges_database_state() {
        let (graph, ids) = graph_with(&[("Post", Some(1))]);
        let mut subjects = SubjectCollection::new();
        let (id, _) = subjects
            .push_if_not_exist(Subject::from_entity(meta("Post"), &graph, ids[0]).unwrap());

        let stored = Subject::from_database(meta("Post"), Row::from_pairs([("id", Value::Int(1))]))
            .unwrap();
        let (again, added) = subjects.push_if_not_exist(stored);

        assert!(!added);
        assert_eq!(again, id);
        let subject = subjects.get(id).unwrap();
        assert!(subject.has_database_entity());
        assert_eq!(subject.entity(), Some(ids[0]));
    }

    #[test]
    fn new_entities_are_distinct_per_instance() {
        let (graph, ids) = graph_with(&[("Details", None), ("Details", None)]);
        let mut subjects = SubjectCollection::new();
        subjects.push_if_not_exist(Subject::from_entity(meta("Details"), &graph, ids[0]).unwrap());
        subjects.push_if_not_exist(Subject::from_entity(meta("Details"), &graph, ids[0]).unwrap());
        subjects.push_if_not_exist(Subject::from_entity(meta("Details"), &graph, ids[1]).unwrap());

        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects.find_by_instance("Details", ids[1]), Some(SubjectId(1)));
    }

    #[test]
    fn push_appends_duplicates() {
        let (graph, ids) = graph_with(&[("Post", Some(1))]);
        let mut subjects = SubjectCollection::new();
        let first = subjects.push(Subject::from_entity(meta("Post"), &graph, ids[0]).unwrap());
        let second = subjects.push(Subject::from_entity(meta("Post"), &graph, ids[0]).unwrap());

        assert_eq!(subjects.len(), 2);
        assert_ne!(first, second);
        assert_eq!(subjects.find_by_identifier("Post", &[Value::BigInt(1)]), Some(first));
    }

    #[test]
    fn find_by_entity_like_uses_primary_key() {
        let (graph, ids) = graph_with(&[("Post", Some(3))]);
        let mut subjects = SubjectCollection::new();
        let id = subjects.push(Subject::from_entity(meta("Post"), &graph, ids[0]).unwrap());

        let sample = Entity::new("Post").with("id", Value::Int(3));
        assert_eq!(subjects.find_by_entity_like(&meta("Post"), &sample), Some(id));
        assert_eq!(
            subjects.find_by_entity_like(&meta("Post"), &Entity::new("Post")),
            None
        );
        assert!(subjects.find(|s| s.entity_name() == "Post").is_some());
        assert!(subjects.find(|s| s.entity_name() == "Tag").is_none());
    }

    #[test]
    fn group_by_entity_targets_skips_new_entities() {
        let (graph, ids) = graph_with(&[
            ("Post", Some(1)),
            ("Category", Some(5)),
            ("Post", Some(2)),
            ("Details", None),
        ]);
        let mut subjects = SubjectCollection::new();
        for (id, name) in ids.iter().zip(["Post", "Category", "Post", "Details"]) {
            subjects.push_if_not_exist(Subject::from_entity(meta(name), &graph, *id).unwrap());
        }

        let groups = subjects.group_by_entity_targets();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].metadata.name, "Post");
        assert_eq!(
            groups[0].identifiers,
            vec![vec![Value::BigInt(1)], vec![Value::BigInt(2)]]
        );
        assert_eq!(groups[1].metadata.name, "Category");
    }

    #[test]
    fn stored_rows_dedup_by_normalized_identifier() {
        let mut subjects = SubjectCollection::new();
        for key in [
            Value::Double(0.0),
            Value::Double(-0.0),
            Value::Int(7),
            Value::BigInt(7),
            Value::Text("7".to_string()),
        ] {
            let row = Row::from_pairs([("id", key)]);
            subjects.push_if_not_exist(Subject::from_database(meta("Reading"), row).unwrap());
        }

        assert_eq!(subjects.len(), 3);
        assert_eq!(
            subjects.find_by_identifier("Reading", &[Value::Double(-0.0)]),
            Some(SubjectId(0))
        );
        assert_eq!(
            subjects.find_by_identifier("Reading", &[Value::Int(7)]),
            Some(SubjectId(1))
        );
        assert_eq!(
            subjects.find_by_identifier("Reading", &[Value::Text("7".to_string())]),
            Some(SubjectId(2))
        );
    }

    #[test]
    fn distinct_identifiers_never_merge() {
        let mut subjects = SubjectCollection::new();
        for i in 0..10_000_i64 {
            let row = Row::from_pairs([("id", Value::BigInt(i))]);
            let (_, added) =
                subjects.push_if_not_exist(Subject::from_database(meta("Post"), row).unwrap());
            assert!(added, "identifier {i} merged into an existing subject");
        }
        assert_eq!(subjects.len(), 10_000);
    }

    #[test]
    fn pending_counts_classify_subjects() {
        let (graph, ids) = graph_with(&[("Post", None)]);
        let registry = MetadataRegistry::new().with(EntityMetadata::new("Post", "posts").primary_key(&["id"]));
        let mut subjects = SubjectCollection::new();
        subjects.push(Subject::from_entity(meta("Post"), &graph, ids[0]).unwrap());
        let (removed, _) = subjects.push_if_not_exist(
            Subject::from_database(meta("Post"), Row::from_pairs([("id", Value::BigInt(9))])).unwrap(),
        );
        subjects.get_mut(removed).unwrap().mark_for_removal();

        let counts = subjects.pending_counts(&graph, &registry);
        assert_eq!(
            counts,
            PendingCounts {
                inserts: 1,
                updates: 0,
                removals: 1
            }
        );
        assert_eq!(counts.total(), 2);
        assert_eq!(subjects.removed().count(), 1);
    }
}
