//! Planner: a validated metadata set bound to a repository.
//!
//! Validation runs once, when the planner is built. Every later
//! [`Planner::plan`] call reuses the checked metadata.

use persistplan_core::{
    Cx, EntityGraph, EntityId, EntityMetadata, Error, MetadataRegistry, Outcome, Repository,
    Result,
};
use persistplan_loader::{DatabaseStateLoader, LoaderConfig, SubjectCollection, validate_registry};

/// Builder for creating a [`Planner`].
#[derive(Debug, Default)]
pub struct PlannerBuilder {
    registry: MetadataRegistry,
    config: LoaderConfig,
}

impl PlannerBuilder {
    /// Create a new planner builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the metadata of one entity type.
    #[must_use]
    pub fn register(mut self, metadata: EntityMetadata) -> Self {
        self.registry.register(metadata);
        self
    }

    /// Replace the metadata set with an existing registry.
    #[must_use]
    pub fn registry(mut self, registry: MetadataRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the metadata set and bind it to `repository`.
    #[allow(clippy::result_large_err)]
    pub fn build<R: Repository>(self, repository: R) -> Result<Planner<R>> {
        if self.config.validate_metadata {
            validate_registry(&self.registry)?;
        }
        tracing::debug!(entities = self.registry.len(), "Planner ready");
        Ok(Planner {
            registry: self.registry,
            repository,
            config: self.config,
        })
    }
}

/// Plans saves of entity graphs against one repository.
#[derive(Debug)]
pub struct Planner<R: Repository> {
    registry: MetadataRegistry,
    repository: R,
    config: LoaderConfig,
}

impl<R: Repository> Planner<R> {
    #[must_use]
    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    #[must_use]
    pub fn repository(&self) -> &R {
        &self.repository
    }

    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Consume the planner and return the underlying repository.
    pub fn into_repository(self) -> R {
        self.repository
    }

    /// Load the subjects needed to save `roots`.
    pub async fn plan(
        &self,
        cx: &Cx,
        graph: &EntityGraph,
        roots: &[EntityId],
    ) -> Outcome<SubjectCollection, Error> {
        // Metadata was checked by the builder.
        let config = LoaderConfig {
            validate_metadata: false,
            ..self.config
        };
        let loader = match DatabaseStateLoader::with_config(&self.registry, &self.repository, config)
        {
            Ok(loader) => loader,
            Err(e) => return Outcome::Err(e),
        };
        loader.load_many(cx, graph, roots).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asupersync::runtime::RuntimeBuilder;
    use persistplan_core::{Cascade, Entity, FindOptions, RelationInfo, Row, Value};

    /// Repository with nothing stored.
    #[derive(Debug)]
    struct EmptyRepository;

    impl Repository for EmptyRepository {
        fn find_by_ids(
            &self,
            _cx: &Cx,
            _metadata: &EntityMetadata,
            _ids: &[Vec<Value>],
            _options: FindOptions,
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(Vec::new()) }
        }

        fn find_one_by(
            &self,
            _cx: &Cx,
            _metadata: &EntityMetadata,
            _column: &str,
            _value: &Value,
            _options: FindOptions,
        ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send {
            async { Outcome::Ok(None) }
        }

        fn find_by(
            &self,
            _cx: &Cx,
            _metadata: &EntityMetadata,
            _column: &str,
            _value: &Value,
            _options: FindOptions,
        ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send {
            async { Outcome::Ok(Vec::new()) }
        }
    }

    fn post() -> EntityMetadata {
        EntityMetadata::new("Post", "posts").primary_key(&["id"]).relation(
            RelationInfo::many_to_one("category", "Category", "category_id")
                .cascade(Cascade::ALL),
        )
    }

    fn category() -> EntityMetadata {
        EntityMetadata::new("Category", "categories").primary_key(&["id"])
    }

    #[test]
    fn build_validates_metadata() {
        let err = PlannerBuilder::new()
            .register(post())
            .build(EmptyRepository)
            .unwrap_err();
        assert!(err.is_configuration());

        let unchecked = PlannerBuilder::new()
            .register(post())
            .config(LoaderConfig {
                validate_metadata: false,
                ..LoaderConfig::default()
            })
            .build(EmptyRepository);
        assert!(unchecked.is_ok());
    }

    #[test]
    fn plan_collects_new_graph() {
        let planner = PlannerBuilder::new()
            .register(post())
            .register(category())
            .build(EmptyRepository)
            .expect("valid metadata");
        assert_eq!(planner.registry().len(), 2);

        let mut graph = EntityGraph::new();
        let post = graph.insert(Entity::new("Post").with("title", "hello"));
        let category = graph.insert(Entity::new("Category").with("id", 3_i64));
        graph.link(post, "category", category);

        let rt = RuntimeBuilder::current_thread()
            .build()
            .expect("create asupersync runtime");
        let cx = Cx::for_testing();
        let subjects = rt.block_on(async {
            match planner.plan(&cx, &graph, &[post]).await {
                Outcome::Ok(subjects) => subjects,
                Outcome::Err(e) => panic!("unexpected error: {e}"),
                Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
                Outcome::Panicked(p) => panic!("panicked: {p:?}"),
            }
        });

        assert_eq!(subjects.len(), 2);
        // Category 3 has an id but no stored row.
        let counts = subjects.pending_counts(&graph, planner.registry());
        assert_eq!(counts.inserts, 2);
        assert_eq!(counts.removals, 0);
    }
}
