//! Core types and traits for persistplan.
//!
//! This crate provides the vocabulary the persistence planner works in:
//!
//! - `RelationInfo` descriptors with typed cardinality and cascade flags
//! - `EntityMetadata` and the `MetadataRegistry` that resolves it by name
//! - `EntityGraph`, an arena of in-memory entities about to be saved
//! - `Repository`, the async read capability the loader is given
//! - `Outcome` re-export from asupersync for cancel-correct operations

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod entity;
pub mod error;
pub mod metadata;
pub mod relationship;
pub mod repository;
pub mod row;
pub mod value;

pub use entity::{Entity, EntityGraph, EntityId, RelationValue};
pub use error::{ConfigViolation, ConfigurationError, Error, FetchError, Result, ViolationKind};
pub use metadata::{EntityMetadata, ExtractedRelation, MetadataRegistry, RelationCountInfo};
pub use relationship::{Cascade, RelationInfo, RelationKind};
pub use repository::{FindOptions, Repository};
pub use row::Row;
pub use value::{IdentityKey, Value};
