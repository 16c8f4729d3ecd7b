//! Pre-flight checks over a metadata set.
//!
//! The loader trusts relation descriptors blindly: a relation count over a
//! singular relation or a missing join key would silently produce a wrong
//! plan. [`validate_many`] rejects such metadata up front and reports every
//! problem at once.

use persistplan_core::{
    ConfigurationError, EntityMetadata, MetadataRegistry, RelationInfo, Result, ViolationKind,
};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

fn identifier_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).expect("identifier pattern is valid"))
}

fn is_plain_identifier(name: &str) -> bool {
    identifier_regex().is_match(name)
}

/// Validate every entry of `metadatas` as one set.
///
/// Relation targets are resolved only against the set itself. All violations
/// are collected before failing; the error lists each offending relation.
#[allow(clippy::result_large_err)]
#[tracing::instrument(level = "debug", skip(metadatas))]
pub fn validate_many<'a, I>(metadatas: I) -> Result<()>
where
    I: IntoIterator<Item = &'a EntityMetadata>,
{
    let set: Vec<&EntityMetadata> = metadatas.into_iter().collect();
    let by_name: HashMap<&str, &EntityMetadata> = set.iter().map(|m| (m.name, *m)).collect();
    let mut errors = ConfigurationError::new();

    for metadata in &set {
        check_entity(metadata, &by_name, &mut errors);
    }

    if errors.is_empty() {
        tracing::debug!(entities = set.len(), "Metadata validated");
    } else {
        tracing::debug!(
            entities = set.len(),
            violations = errors.violations.len(),
            "Metadata rejected"
        );
    }
    errors.into_result()
}

/// Validate every entry of a registry.
#[allow(clippy::result_large_err)]
pub fn validate_registry(registry: &MetadataRegistry) -> Result<()> {
    validate_many(registry.iter())
}

fn check_entity(
    metadata: &EntityMetadata,
    by_name: &HashMap<&str, &EntityMetadata>,
    errors: &mut ConfigurationError,
) {
    if metadata.primary_key.is_empty() {
        errors.add(
            metadata.name,
            None,
            ViolationKind::MissingPrimaryKey,
            "entity declares no primary key columns",
        );
    }

    for count in &metadata.relation_counts {
        match metadata.find_relation(count.relation) {
            None => errors.add(
                metadata.name,
                Some(count.relation),
                ViolationKind::UnknownCountedRelation,
                format!(
                    "relation count '{}' refers to an unknown relation",
                    count.property
                ),
            ),
            Some(relation) if relation.kind.is_singular() => errors.add(
                metadata.name,
                Some(relation.name),
                ViolationKind::RelationCountOnSingular,
                format!(
                    "relation count '{}' can only be declared over a one-to-many relation",
                    count.property
                ),
            ),
            Some(_) => {}
        }
    }

    for relation in &metadata.relations {
        check_join_key(metadata, relation, errors);

        let Some(target) = by_name.get(relation.target) else {
            errors.add(
                metadata.name,
                Some(relation.name),
                ViolationKind::UnknownTarget,
                format!("target entity '{}' is not registered", relation.target),
            );
            continue;
        };
        check_inverse_side(metadata, relation, target, errors);
    }
}

fn check_join_key(
    metadata: &EntityMetadata,
    relation: &RelationInfo,
    errors: &mut ConfigurationError,
) {
    let (column, label) = if relation.kind.is_owner_side() {
        (relation.local_key, "local")
    } else {
        (relation.remote_key, "remote")
    };

    match column {
        None => errors.add(
            metadata.name,
            Some(relation.name),
            ViolationKind::MissingJoinKey,
            format!("{:?} relation requires a {label} join column", relation.kind),
        ),
        Some(column) if !is_plain_identifier(column) => errors.add(
            metadata.name,
            Some(relation.name),
            ViolationKind::InvalidIdentifier,
            format!("join column '{column}' is not a valid identifier"),
        ),
        Some(_) => {}
    }
}

fn check_inverse_side(
    metadata: &EntityMetadata,
    relation: &RelationInfo,
    target: &EntityMetadata,
    errors: &mut ConfigurationError,
) {
    let Some(inverse_name) = relation.inverse_side else {
        return;
    };
    let Some(inverse) = target.find_relation(inverse_name) else {
        errors.add(
            metadata.name,
            Some(relation.name),
            ViolationKind::AsymmetricInverse,
            format!("inverse side '{}.{inverse_name}' does not exist", target.name),
        );
        return;
    };

    let points_back = inverse.target == metadata.name
        && inverse.inverse_side.is_none_or(|back| back == relation.name);
    if !points_back {
        errors.add(
            metadata.name,
            Some(relation.name),
            ViolationKind::AsymmetricInverse,
            format!(
                "inverse side '{}.{inverse_name}' does not point back to this relation",
                target.name
            ),
        );
    }
}
