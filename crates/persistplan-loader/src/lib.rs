//! Cascade resolution and database-state loading.
//!
//! `persistplan-loader` decides, for an object graph about to be saved,
//! which entities are new, changed or removed, and loads exactly the stored
//! state needed to tell.
//!
//! # Role In The Architecture
//!
//! - **Validation**: [`validate_many`] rejects relation/cascade combinations
//!   the loader cannot plan for.
//! - **Subjects**: a [`Subject`] pairs an in-memory entity with its stored
//!   row; a [`SubjectCollection`] holds exactly one subject per identity.
//! - **Loading**: [`DatabaseStateLoader`] walks cascades, batches reads and
//!   detects cascaded removals.
//!
//! The loader never writes. All reads go through an injected
//! [`Repository`](persistplan_core::Repository) and integrate with asupersync
//! via `Cx` + `Outcome`.
//!
//! # Example
//!
//! ```ignore
//! let loader = match DatabaseStateLoader::new(&registry, &repository) {
//!     Ok(loader) => loader,
//!     Err(e) => return Outcome::Err(e),
//! };
//! let subjects = match loader.load(&cx, &graph, post).await {
//!     Outcome::Ok(subjects) => subjects,
//!     Outcome::Err(e) => return Outcome::Err(e),
//!     Outcome::Cancelled(r) => return Outcome::Cancelled(r),
//!     Outcome::Panicked(p) => return Outcome::Panicked(p),
//! };
//! for removed in subjects.removed() {
//!     println!("DELETE {}", removed.entity_name());
//! }
//! ```

pub mod collection;
pub mod loader;
pub mod subject;
pub mod validator;

pub use collection::{PendingCounts, SubjectCollection, SubjectGroup};
pub use loader::DatabaseStateLoader;
pub use subject::{Subject, SubjectId, SubjectIdentity, SubjectKey, SubjectOperation};
pub use validator::{validate_many, validate_registry};

use serde::{Deserialize, Serialize};

/// Configuration for [`DatabaseStateLoader`] behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Ask the repository for foreign-key columns instead of hydrated
    /// relations.
    pub relation_ids_only: bool,
    /// Run [`validate_registry`] when the loader is constructed.
    pub validate_metadata: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            relation_ids_only: true,
            validate_metadata: true,
        }
    }
}
