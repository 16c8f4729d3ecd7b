//! Read capability consumed by the loader.
//!
//! The loader never builds SQL or owns connections. It issues logical read
//! requests through a [`Repository`], which drivers implement on top of
//! whatever connection they manage.
//!
//! All operations integrate with asupersync's structured concurrency via a
//! `Cx` context and return an [`Outcome`].

use crate::error::Error;
use crate::metadata::EntityMetadata;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};

/// Options for a repository read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Return foreign-key columns for relations instead of hydrating related
    /// objects.
    pub relation_ids_only: bool,
}

impl FindOptions {
    /// Options requesting the relation-identifier projection.
    #[must_use]
    pub const fn relation_ids() -> Self {
        Self {
            relation_ids_only: true,
        }
    }
}

/// Storage reads keyed by entity metadata.
///
/// Implementations must be `Send + Sync`; the loader issues several reads
/// concurrently against one shared repository.
pub trait Repository: Send + Sync {
    /// Load every row of `metadata` whose primary key is one of `ids`.
    ///
    /// Each element of `ids` holds the key values in `metadata.primary_key`
    /// order. Missing rows are simply absent from the result.
    fn find_by_ids(
        &self,
        cx: &Cx,
        metadata: &EntityMetadata,
        ids: &[Vec<Value>],
        options: FindOptions,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Load the first row of `metadata` where `column = value`, if any.
    fn find_one_by(
        &self,
        cx: &Cx,
        metadata: &EntityMetadata,
        column: &str,
        value: &Value,
        options: FindOptions,
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Load every row of `metadata` where `column = value`.
    fn find_by(
        &self,
        cx: &Cx,
        metadata: &EntityMetadata,
        column: &str,
        value: &Value,
        options: FindOptions,
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;
}
