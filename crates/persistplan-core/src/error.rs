//! Error types for persistplan operations.

use serde::Serialize;
use std::fmt;

/// The primary error type for all persistplan operations.
#[derive(Debug)]
pub enum Error {
    /// Relation/cascade configuration rejected before loading
    Configuration(ConfigurationError),
    /// A repository read failed
    Fetch(FetchError),
}

/// Aggregate of every invalid relation/cascade combination found in a
/// metadata set.
#[derive(Debug, Clone, Default)]
pub struct ConfigurationError {
    pub violations: Vec<ConfigViolation>,
}

/// One offending entry in a [`ConfigurationError`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigViolation {
    /// Entity the offending declaration lives on.
    pub entity: String,
    /// Relation (or relation-count property) involved, if any.
    pub relation: Option<String>,
    pub kind: ViolationKind,
    pub message: String,
}

/// The structural rule a [`ConfigViolation`] breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ViolationKind {
    /// A relation count was declared over a singular relation
    RelationCountOnSingular,
    /// A relation count names a relation that does not exist
    UnknownCountedRelation,
    /// Relation target is not part of the metadata set
    UnknownTarget,
    /// Entity declares no primary key columns
    MissingPrimaryKey,
    /// Relation lacks the join key its cardinality requires
    MissingJoinKey,
    /// Join column is not a plain SQL identifier
    InvalidIdentifier,
    /// Inverse side does not exist or does not point back
    AsymmetricInverse,
}

#[derive(Debug)]
pub struct FetchError {
    /// Entity whose rows were being read.
    pub entity: String,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConfigurationError {
    /// Create a new empty violation container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if there are any violations.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Record a violation.
    pub fn add(
        &mut self,
        entity: impl Into<String>,
        relation: Option<&str>,
        kind: ViolationKind,
        message: impl Into<String>,
    ) {
        self.violations.push(ConfigViolation {
            entity: entity.into(),
            relation: relation.map(str::to_string),
            kind,
            message: message.into(),
        });
    }

    /// Violations of one kind.
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &ConfigViolation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }

    /// Convert to `Ok(())` when empty, `Err` otherwise.
    #[allow(clippy::result_large_err)]
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(self))
        }
    }
}

impl FetchError {
    /// Create a fetch error without an underlying cause.
    pub fn new(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            message: message.into(),
            source: None,
        }
    }
}

impl Error {
    /// Is this a configuration error raised before loading began?
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Is this a repository failure?
    pub fn is_fetch(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(e) => write!(f, "Configuration error: {}", e),
            Error::Fetch(e) => write!(f, "Fetch error on '{}': {}", e.entity, e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Fetch(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Configuration(e) => Some(e),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(rel) => write!(f, "{}.{}: {}", self.entity, rel, self.message),
            None => write!(f, "{}: {}", self.entity, self.message),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            write!(f, "configuration is valid")
        } else if self.violations.len() == 1 {
            write!(f, "{}", self.violations[0])
        } else {
            writeln!(f, "{} invalid relation declarations:", self.violations.len())?;
            for v in &self.violations {
                writeln!(f, "  - {}", v)?;
            }
            Ok(())
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<ConfigurationError> for Error {
    fn from(err: ConfigurationError) -> Self {
        Error::Configuration(err)
    }
}

impl From<FetchError> for Error {
    fn from(err: FetchError) -> Self {
        Error::Fetch(err)
    }
}

/// Result type alias for persistplan operations.
pub type Result<T> = std::result::Result<T, Error>;
