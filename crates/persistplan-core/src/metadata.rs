//! Entity metadata and the registry that resolves it by name.

use crate::entity::{Entity, RelationValue};
use crate::relationship::RelationInfo;
use std::collections::HashMap;
use std::sync::Arc;

/// A relation-count declaration: `property` holds the number of entities in
/// the collection relation `relation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationCountInfo {
    pub property: &'static str,
    pub relation: &'static str,
}

/// Static description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Entity name used to resolve relation targets.
    pub name: &'static str,
    pub table_name: &'static str,
    pub primary_key: &'static [&'static str],
    pub relations: Vec<RelationInfo>,
    pub relation_counts: Vec<RelationCountInfo>,
}

/// One `(relation, value, related metadata)` triple extracted from an entity.
#[derive(Debug, Clone, Copy)]
pub struct ExtractedRelation<'a> {
    pub relation: &'a RelationInfo,
    pub value: &'a RelationValue,
    pub metadata: &'a Arc<EntityMetadata>,
}

impl EntityMetadata {
    #[must_use]
    pub fn new(name: &'static str, table_name: &'static str) -> Self {
        Self {
            name,
            table_name,
            primary_key: &[],
            relations: Vec::new(),
            relation_counts: Vec::new(),
        }
    }

    #[must_use]
    pub fn primary_key(mut self, columns: &'static [&'static str]) -> Self {
        self.primary_key = columns;
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationInfo) -> Self {
        self.relations.push(relation);
        self
    }

    /// Declare `property` as the count of the collection relation `relation`.
    #[must_use]
    pub fn relation_count(mut self, property: &'static str, relation: &'static str) -> Self {
        self.relation_counts
            .push(RelationCountInfo { property, relation });
        self
    }

    /// Find a relation by property name.
    #[must_use]
    pub fn find_relation(&self, name: &str) -> Option<&RelationInfo> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Extract every relation value of `entity` paired with the related
    /// entity's metadata.
    ///
    /// Relations whose target is not registered are skipped with a warning;
    /// the validator reports them as configuration errors.
    pub fn extract_relation_values<'a>(
        &'a self,
        entity: &'a Entity,
        registry: &'a MetadataRegistry,
    ) -> Vec<ExtractedRelation<'a>> {
        self.relations
            .iter()
            .filter_map(|relation| {
                let Some(metadata) = registry.get(relation.target) else {
                    tracing::warn!(
                        entity = self.name,
                        relation = relation.name,
                        target = relation.target,
                        "Relation target has no metadata; skipping"
                    );
                    return None;
                };
                Some(ExtractedRelation {
                    relation,
                    value: entity.relation(relation.name),
                    metadata,
                })
            })
            .collect()
    }
}

/// Registry of entity metadata, keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entries: Vec<Arc<EntityMetadata>>,
    by_name: HashMap<&'static str, usize>,
}

impl MetadataRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register metadata; a second registration under the same name replaces
    /// the first.
    pub fn register(&mut self, metadata: EntityMetadata) -> &mut Self {
        let name = metadata.name;
        let metadata = Arc::new(metadata);
        match self.by_name.get(name) {
            Some(&idx) => self.entries[idx] = metadata,
            None => {
                self.by_name.insert(name, self.entries.len());
                self.entries.push(metadata);
            }
        }
        self
    }

    /// Builder form of [`MetadataRegistry::register`].
    #[must_use]
    pub fn with(mut self, metadata: EntityMetadata) -> Self {
        self.register(metadata);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EntityMetadata>> {
        self.by_name.get(name).map(|&idx| &self.entries[idx])
    }

    /// All registered metadata in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityMetadata> {
        self.entries.iter().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::Cascade;

    fn registry() -> MetadataRegistry {
        MetadataRegistry::new()
            .with(
                EntityMetadata::new("Post", "posts")
                    .primary_key(&["id"])
                    .relation(
                        RelationInfo::many_to_one("category", "Category", "category_id")
                            .cascade(Cascade::ALL),
                    )
                    .relation(RelationInfo::many_to_one("author", "Author", "author_id")),
            )
            .with(EntityMetadata::new("Category", "categories").primary_key(&["id"]))
    }

    #[test]
    fn register_replaces_by_name() {
        let mut reg = registry();
        assert_eq!(reg.len(), 2);
        reg.register(EntityMetadata::new("Category", "cats").primary_key(&["id"]));
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("Category").unwrap().table_name, "cats");
    }

    #[test]
    fn extract_skips_unregistered_targets() {
        let reg = registry();
        let post_meta = reg.get("Post").unwrap();
        let post = Entity::new("Post")
            .with("id", 1_i64)
            .with_relation("category", RelationValue::Null);

        let extracted = post_meta.extract_relation_values(&post, &reg);
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].relation.name, "category");
        assert_eq!(extracted[0].value, &RelationValue::Null);
        assert_eq!(extracted[0].metadata.name, "Category");
    }

    #[test]
    fn relation_count_declaration() {
        let meta = EntityMetadata::new("Post", "posts").relation_count("commentCount", "comments");
        assert_eq!(
            meta.relation_counts,
            vec![RelationCountInfo {
                property: "commentCount",
                relation: "comments"
            }]
        );
        assert!(meta.find_relation("comments").is_none());
    }
}
