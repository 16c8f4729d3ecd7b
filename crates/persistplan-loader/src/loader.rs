//! The database-state loader.
//!
//! Loading runs in three strictly ordered phases:
//!
//! 1. **Write discovery**: walk the in-memory graph from the roots, following
//!    only relations that cascade insert or update, and collect one subject
//!    per distinct entity.
//! 2. **Batched fetch**: one `find_by_ids` per entity type, run concurrently,
//!    fills in the stored row of every subject that has an identifier.
//! 3. **Removal discovery**: for every subject with a stored row, compare the
//!    stored relation ids with the in-memory ones across remove-cascading
//!    relations. Related rows that are no longer referenced are loaded and
//!    marked for removal, and their own remove-cascades are followed in the
//!    next wave.
//!
//! The loader never writes. Its output is the [`SubjectCollection`] the write
//! stage consumes.

use crate::collection::SubjectCollection;
use crate::subject::{Subject, SubjectId};
use crate::validator::validate_registry;
use crate::LoaderConfig;
use futures::future::join_all;
use persistplan_core::{
    Cx, EntityGraph, EntityId, EntityMetadata, Error, FindOptions, MetadataRegistry, Outcome,
    RelationInfo, RelationKind, RelationValue, Repository, Result, Row, Value,
};
use std::collections::HashSet;
use std::sync::Arc;

static CLEARED: RelationValue = RelationValue::Null;

/// How the related rows of one removal check are read.
#[derive(Debug, Clone)]
enum Lookup {
    /// Owner side: the stored foreign key identifies the related row.
    ById(Vec<Value>),
    /// Inverse one-to-one: the related table points back at us.
    OneBy { column: &'static str, value: Value },
    /// One-to-many: every related row pointing back at us.
    ManyBy { column: &'static str, value: Value },
}

/// A removal check that needs a repository read.
#[derive(Debug, Clone)]
struct RemovalCheck {
    subject: SubjectId,
    relation: RelationInfo,
    target: Arc<EntityMetadata>,
    /// Identifiers the in-memory entity still references.
    persisted_ids: Vec<Vec<Value>>,
    lookup: Lookup,
}

#[derive(Debug)]
enum PlannedRemoval {
    /// Related subject already in the collection with a stored row.
    Mark(SubjectId),
    Fetch(RemovalCheck),
}

/// Loads the stored state needed to plan a save of an entity graph.
#[derive(Debug)]
pub struct DatabaseStateLoader<'a, R: Repository> {
    registry: &'a MetadataRegistry,
    repository: &'a R,
    config: LoaderConfig,
}

impl<'a, R: Repository> DatabaseStateLoader<'a, R> {
    /// Create a loader with the default configuration.
    ///
    /// Fails with [`Error::Configuration`] if the registry does not pass
    /// validation.
    #[allow(clippy::result_large_err)]
    pub fn new(registry: &'a MetadataRegistry, repository: &'a R) -> Result<Self> {
        Self::with_config(registry, repository, LoaderConfig::default())
    }

    /// Create a loader with a custom configuration.
    #[allow(clippy::result_large_err)]
    pub fn with_config(
        registry: &'a MetadataRegistry,
        repository: &'a R,
        config: LoaderConfig,
    ) -> Result<Self> {
        if config.validate_metadata {
            validate_registry(registry)?;
        }
        Ok(Self {
            registry,
            repository,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    fn find_options(&self) -> FindOptions {
        FindOptions {
            relation_ids_only: self.config.relation_ids_only,
        }
    }

    /// Load the state needed to save `root` and everything it cascades to.
    pub async fn load(
        &self,
        cx: &Cx,
        graph: &EntityGraph,
        root: EntityId,
    ) -> Outcome<SubjectCollection, Error> {
        self.load_many(cx, graph, &[root]).await
    }

    /// Load the state needed to save several roots in one plan.
    ///
    /// Entities reachable from more than one root appear once.
    #[tracing::instrument(level = "debug", skip_all, fields(roots = roots.len()))]
    pub async fn load_many(
        &self,
        cx: &Cx,
        graph: &EntityGraph,
        roots: &[EntityId],
    ) -> Outcome<SubjectCollection, Error> {
        let mut subjects = SubjectCollection::new();

        for &root in roots {
            let Some(entity) = graph.get(root) else {
                tracing::warn!(root = root.index(), "Root is not part of the entity graph");
                continue;
            };
            let Some(metadata) = self.registry.get(entity.target()) else {
                tracing::warn!(entity = entity.target(), "Root entity has no metadata");
                continue;
            };
            let Some(subject) = Subject::from_entity(Arc::clone(metadata), graph, root) else {
                continue;
            };
            let (id, added) = subjects.push_if_not_exist(subject);
            if added {
                self.discover_writes(graph, &mut subjects, id);
            }
        }
        tracing::debug!(subjects = subjects.len(), "Write discovery complete");

        match self.fetch_database_state(cx, &mut subjects).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        match self.discover_removals(cx, graph, &mut subjects).await {
            Outcome::Ok(()) => {}
            Outcome::Err(e) => return Outcome::Err(e),
            Outcome::Cancelled(r) => return Outcome::Cancelled(r),
            Outcome::Panicked(p) => return Outcome::Panicked(p),
        }

        tracing::debug!(
            subjects = subjects.len(),
            removed = subjects.removed().count(),
            "Database state loaded"
        );
        Outcome::Ok(subjects)
    }

    /// Phase 1. Follow insert/update cascades depth-first from `start`.
    fn discover_writes(&self, graph: &EntityGraph, subjects: &mut SubjectCollection, start: SubjectId) {
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            let Some(subject) = subjects.get(current) else {
                continue;
            };
            let Some(entity) = subject.persisted(graph) else {
                continue;
            };
            let metadata = Arc::clone(subject.metadata());

            for extracted in metadata.extract_relation_values(entity, self.registry) {
                let relation = extracted.relation;
                if !relation.cascade.follows_writes()
                    || !relation.is_entity_defined(graph, extracted.value)
                {
                    continue;
                }
                for &related in extracted.value.ids() {
                    let Some(subject) =
                        Subject::from_entity(Arc::clone(extracted.metadata), graph, related)
                    else {
                        tracing::warn!(
                            entity = metadata.name,
                            relation = relation.name,
                            "Relation references an entity outside the graph"
                        );
                        continue;
                    };
                    let (id, added) = subjects.push_if_not_exist(subject);
                    if added {
                        tracing::trace!(
                            entity = metadata.name,
                            relation = relation.name,
                            target = relation.target,
                            "Collected related subject"
                        );
                        stack.push(id);
                    }
                }
            }
        }
    }

    /// Phase 2. One batched read per entity type, joined.
    async fn fetch_database_state(
        &self,
        cx: &Cx,
        subjects: &mut SubjectCollection,
    ) -> Outcome<(), Error> {
        let groups = subjects.group_by_entity_targets();
        if groups.is_empty() {
            return Outcome::Ok(());
        }

        let options = self.find_options();
        let results = join_all(groups.iter().map(|group| {
            tracing::trace!(
                entity = group.metadata.name,
                ids = group.identifiers.len(),
                "Fetching stored rows"
            );
            self.repository
                .find_by_ids(cx, &group.metadata, &group.identifiers, options)
        }))
        .await;

        for (group, result) in groups.iter().zip(results) {
            let rows = match result {
                Outcome::Ok(rows) => rows,
                Outcome::Err(e) => return Outcome::Err(e),
                Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                Outcome::Panicked(p) => return Outcome::Panicked(p),
            };
            let metadata = &group.metadata;
            for row in rows {
                let Some(identifier) = row.key_values(metadata.primary_key) else {
                    tracing::warn!(entity = metadata.name, "Fetched row has no primary key");
                    continue;
                };
                let Some(id) = subjects.find_by_identifier(metadata.name, &identifier) else {
                    tracing::trace!(entity = metadata.name, "Fetched row matches no subject");
                    continue;
                };
                if let Some(subject) = subjects.get_mut(id) {
                    subject.set_database_entity(row);
                }
            }
        }
        Outcome::Ok(())
    }

    /// Phase 3. Wave-by-wave removal detection.
    async fn discover_removals(
        &self,
        cx: &Cx,
        graph: &EntityGraph,
        subjects: &mut SubjectCollection,
    ) -> Outcome<(), Error> {
        // A subject is expanded once live and, if it gets marked later, once
        // more with every relation treated as cleared.
        let mut expanded: HashSet<(SubjectId, bool)> = HashSet::new();
        let mut frontier: Vec<SubjectId> = subjects
            .iter()
            .filter(|(_, s)| s.has_database_entity())
            .map(|(id, _)| id)
            .collect();
        let mut wave = 0_usize;

        while !frontier.is_empty() {
            wave += 1;
            let mut planned = Vec::new();
            for id in frontier {
                let Some(subject) = subjects.get(id) else {
                    continue;
                };
                if expanded.insert((id, subject.is_marked_for_removal())) {
                    self.plan_removals(graph, subjects, id, &mut planned);
                }
            }

            let mut next = Vec::new();
            let mut checks = Vec::new();
            for plan in planned {
                match plan {
                    PlannedRemoval::Mark(id) => mark(subjects, id, &mut next),
                    PlannedRemoval::Fetch(check) => checks.push(check),
                }
            }

            tracing::debug!(wave, lookups = checks.len(), "Removal wave");
            let results = join_all(checks.iter().map(|check| self.run_lookup(cx, check))).await;

            for (check, result) in checks.iter().zip(results) {
                let rows = match result {
                    Outcome::Ok(rows) => rows,
                    Outcome::Err(e) => return Outcome::Err(e),
                    Outcome::Cancelled(r) => return Outcome::Cancelled(r),
                    Outcome::Panicked(p) => return Outcome::Panicked(p),
                };
                for row in rows {
                    apply_fetched_row(subjects, check, row, &mut next);
                }
            }
            frontier = next;
        }
        Outcome::Ok(())
    }

    fn plan_removals(
        &self,
        graph: &EntityGraph,
        subjects: &SubjectCollection,
        id: SubjectId,
        planned: &mut Vec<PlannedRemoval>,
    ) {
        let Some(subject) = subjects.get(id) else {
            return;
        };
        let Some(row) = subject.database_entity() else {
            return;
        };
        // A subject being removed, or never handed in, keeps no relations.
        let persisted = if subject.is_marked_for_removal() {
            None
        } else {
            subject.persisted(graph)
        };

        for relation in subject
            .metadata()
            .relations
            .iter()
            .filter(|r| r.is_cascade_remove())
        {
            let Some(target) = self.registry.get(relation.target) else {
                tracing::warn!(
                    entity = subject.entity_name(),
                    relation = relation.name,
                    "Removal target has no metadata; skipping"
                );
                continue;
            };
            let value = persisted.map_or(&CLEARED, |e| e.relation(relation.name));
            if value.is_unset() {
                continue;
            }
            let persisted_ids: Vec<Vec<Value>> = value
                .ids()
                .iter()
                .filter_map(|handle| graph.get(*handle))
                .filter_map(|related| related.primary_key_value(target))
                .collect();

            let lookup = match relation.kind {
                RelationKind::ManyToOne | RelationKind::OneToOneOwner => {
                    let Some(stored) = relation.own_relation_id(row) else {
                        continue;
                    };
                    let stored_id = vec![stored.clone()];
                    if contains_identity(&persisted_ids, &stored_id) {
                        continue;
                    }
                    if let Some(existing) = subjects.find_by_identifier(target.name, &stored_id) {
                        if subjects
                            .get(existing)
                            .is_some_and(Subject::has_database_entity)
                        {
                            planned.push(PlannedRemoval::Mark(existing));
                            continue;
                        }
                    }
                    Lookup::ById(stored_id)
                }
                RelationKind::OneToOneInverse | RelationKind::OneToMany => {
                    let Some(column) = relation.remote_key else {
                        tracing::warn!(
                            entity = subject.entity_name(),
                            relation = relation.name,
                            "Relation has no remote key; skipping"
                        );
                        continue;
                    };
                    let Some(value) = single_key(subject.identifier()) else {
                        tracing::warn!(
                            entity = subject.entity_name(),
                            relation = relation.name,
                            "Inverse lookup needs a single-column identifier; skipping"
                        );
                        continue;
                    };
                    if relation.is_one_to_many() {
                        Lookup::ManyBy { column, value }
                    } else {
                        Lookup::OneBy { column, value }
                    }
                }
            };

            planned.push(PlannedRemoval::Fetch(RemovalCheck {
                subject: id,
                relation: *relation,
                target: Arc::clone(target),
                persisted_ids,
                lookup,
            }));
        }
    }

    async fn run_lookup(&self, cx: &Cx, check: &RemovalCheck) -> Outcome<Vec<Row>, Error> {
        let options = self.find_options();
        tracing::trace!(
            subject = check.subject.index(),
            relation = check.relation.name,
            target = check.target.name,
            "Looking up removal candidates"
        );
        match &check.lookup {
            Lookup::ById(id) => {
                self.repository
                    .find_by_ids(cx, &check.target, std::slice::from_ref(id), options)
                    .await
            }
            Lookup::OneBy { column, value } => {
                match self
                    .repository
                    .find_one_by(cx, &check.target, column, value, options)
                    .await
                {
                    Outcome::Ok(row) => Outcome::Ok(row.into_iter().collect()),
                    Outcome::Err(e) => Outcome::Err(e),
                    Outcome::Cancelled(r) => Outcome::Cancelled(r),
                    Outcome::Panicked(p) => Outcome::Panicked(p),
                }
            }
            Lookup::ManyBy { column, value } => {
                self.repository
                    .find_by(cx, &check.target, column, value, options)
                    .await
            }
        }
    }
}

/// Mark `id` and queue it for expansion, once.
fn mark(subjects: &mut SubjectCollection, id: SubjectId, next: &mut Vec<SubjectId>) {
    if let Some(subject) = subjects.get_mut(id) {
        if !subject.is_marked_for_removal() {
            subject.mark_for_removal();
            next.push(id);
        }
    }
}

fn apply_fetched_row(
    subjects: &mut SubjectCollection,
    check: &RemovalCheck,
    row: Row,
    next: &mut Vec<SubjectId>,
) {
    let Some(identifier) = row.key_values(check.target.primary_key) else {
        tracing::warn!(entity = check.target.name, "Related row has no primary key");
        return;
    };
    if contains_identity(&check.persisted_ids, &identifier) {
        return;
    }
    let Some(related) = Subject::from_database(Arc::clone(&check.target), row) else {
        return;
    };
    let (id, added) = subjects.push_if_not_exist(related);
    if !added && matches!(check.lookup, Lookup::OneBy { .. } | Lookup::ManyBy { .. }) {
        // Persisted by another root under a new parent: an update, not an orphan.
        let reparented = subjects
            .get(id)
            .is_some_and(|s| s.entity().is_some() && !s.is_marked_for_removal());
        if reparented {
            tracing::trace!(
                relation = check.relation.name,
                target = check.target.name,
                "Related entity is persisted elsewhere in the plan"
            );
            return;
        }
    }
    tracing::debug!(
        relation = check.relation.name,
        target = check.target.name,
        "Related entity marked for removal"
    );
    mark(subjects, id, next);
}

fn contains_identity(ids: &[Vec<Value>], candidate: &[Value]) -> bool {
    ids.iter().any(|id| {
        id.len() == candidate.len() && id.iter().zip(candidate).all(|(a, b)| a.same_identity(b))
    })
}

fn single_key(identifier: Option<&[Value]>) -> Option<Value> {
    match identifier? {
        [value] => Some(value.clone()),
        _ => None,
    }
}
