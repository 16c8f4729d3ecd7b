//! persistplan - decide what saving an object graph has to write.
//!
//! Given an in-memory graph of entities about to be saved, persistplan works
//! out, entity by entity, whether each one is new, changed or removed, and
//! loads exactly the stored state needed to tell:
//!
//! - Typed relation descriptors with independent insert/update/remove cascades
//! - Pre-flight validation of relation and relation-count declarations
//! - Batched, concurrent reads through an injected `Repository`
//! - Cascaded removal detection for cleared and replaced relations
//!
//! # Quick Start
//!
//! ```ignore
//! use persistplan::prelude::*;
//!
//! let planner = PlannerBuilder::new()
//!     .register(
//!         EntityMetadata::new("Post", "posts")
//!             .primary_key(&["id"])
//!             .relation(
//!                 RelationInfo::many_to_one("category", "Category", "category_id")
//!                     .cascade(Cascade::ALL),
//!             ),
//!     )
//!     .register(EntityMetadata::new("Category", "categories").primary_key(&["id"]))
//!     .build(repository)?;
//!
//! let mut graph = EntityGraph::new();
//! let post = graph.insert(
//!     Entity::new("Post")
//!         .with("id", 1_i64)
//!         .with_relation("category", RelationValue::Null),
//! );
//!
//! let subjects = planner.plan(cx, &graph, &[post]).await;
//! ```
//!
//! # Features
//!
//! - **Structured concurrency**: Built on asupersync for cancel-correct reads
//! - **No writes**: The output is a `SubjectCollection` for a write stage
//! - **Explicit state**: `Unset` and `Null` relations are never conflated

pub use persistplan_core::{
    Cascade, ConfigViolation, ConfigurationError, Cx, Entity, EntityGraph, EntityId,
    EntityMetadata, Error, FetchError, FindOptions, MetadataRegistry, Outcome, RelationInfo,
    RelationKind, RelationValue, Repository, Result, Row, Value, ViolationKind,
};

pub use persistplan_loader::{
    DatabaseStateLoader, LoaderConfig, PendingCounts, Subject, SubjectCollection, SubjectId,
    SubjectOperation, validate_many, validate_registry,
};

pub mod planner;
pub use planner::{Planner, PlannerBuilder};

/// Commonly used items.
pub mod prelude {
    pub use crate::{
        // asupersync
        Cx,
        Outcome,
        // Metadata
        Cascade,
        EntityMetadata,
        MetadataRegistry,
        RelationInfo,
        // Entities
        Entity,
        EntityGraph,
        RelationValue,
        Value,
        // Planning
        Error,
        LoaderConfig,
        Planner,
        PlannerBuilder,
        Repository,
        Result,
        SubjectCollection,
        SubjectOperation,
    };
}
