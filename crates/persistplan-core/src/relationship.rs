//! Relation metadata for persistplan.
//!
//! Relations are described once, when metadata is built, and carried as
//! typed descriptors. The loader decides traversal and removal detection by
//! matching on [`RelationKind`] instead of probing property names at runtime.

use crate::entity::{EntityGraph, RelationValue};
use crate::row::Row;
use crate::value::Value;

/// Cardinality and ownership of a relation, seen from the declaring entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RelationKind {
    /// Many-to-one: many `Post`s belong to one `Category`. The foreign key
    /// lives on this side.
    #[default]
    ManyToOne,
    /// One-to-one, owning side: the foreign key lives on this side.
    OneToOneOwner,
    /// One-to-one, inverse side: the related table stores the foreign key
    /// pointing back here.
    OneToOneInverse,
    /// One-to-many: one `Post` has many `Comment`s, each storing the key.
    OneToMany,
}

impl RelationKind {
    /// Does this relation hold at most one related entity?
    #[must_use]
    pub const fn is_singular(&self) -> bool {
        !matches!(self, RelationKind::OneToMany)
    }

    /// Is the foreign key stored on the declaring entity's table?
    #[must_use]
    pub const fn is_owner_side(&self) -> bool {
        matches!(self, RelationKind::ManyToOne | RelationKind::OneToOneOwner)
    }
}

/// Cascade flags, each enabled independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cascade {
    pub insert: bool,
    pub update: bool,
    pub remove: bool,
}

impl Cascade {
    /// No cascading at all.
    pub const NONE: Cascade = Cascade {
        insert: false,
        update: false,
        remove: false,
    };

    /// Insert, update and remove all cascade.
    pub const ALL: Cascade = Cascade {
        insert: true,
        update: true,
        remove: true,
    };

    #[must_use]
    pub const fn with_insert(mut self) -> Self {
        self.insert = true;
        self
    }

    #[must_use]
    pub const fn with_update(mut self) -> Self {
        self.update = true;
        self
    }

    #[must_use]
    pub const fn with_remove(mut self) -> Self {
        self.remove = true;
        self
    }

    /// Should the insert/update traversal follow this relation?
    #[must_use]
    pub const fn follows_writes(&self) -> bool {
        self.insert || self.update
    }
}

/// Metadata about one relation declared on an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationInfo {
    /// Property name of the relation on the declaring entity.
    pub name: &'static str,

    /// Name of the related entity.
    pub target: &'static str,

    pub kind: RelationKind,

    /// Foreign-key column on the declaring entity's table (owner side).
    /// e.g., `"category_id"` on `Post`.
    pub local_key: Option<&'static str>,

    /// Foreign-key column on the related table pointing back (inverse
    /// one-to-one and one-to-many). e.g., `"post_id"` on `Comment`.
    pub remote_key: Option<&'static str>,

    /// Relation on the target that describes the other end of this one.
    pub inverse_side: Option<&'static str>,

    pub cascade: Cascade,
}

impl RelationInfo {
    /// Create a new relation with required fields.
    #[must_use]
    pub const fn new(name: &'static str, target: &'static str, kind: RelationKind) -> Self {
        Self {
            name,
            target,
            kind,
            local_key: None,
            remote_key: None,
            inverse_side: None,
            cascade: Cascade::NONE,
        }
    }

    /// Many-to-one relation stored in `local_key`.
    #[must_use]
    pub const fn many_to_one(
        name: &'static str,
        target: &'static str,
        local_key: &'static str,
    ) -> Self {
        Self::new(name, target, RelationKind::ManyToOne).local_key(local_key)
    }

    /// Owning one-to-one relation stored in `local_key`.
    #[must_use]
    pub const fn one_to_one_owner(
        name: &'static str,
        target: &'static str,
        local_key: &'static str,
    ) -> Self {
        Self::new(name, target, RelationKind::OneToOneOwner).local_key(local_key)
    }

    /// Inverse one-to-one relation; the target stores `remote_key`.
    #[must_use]
    pub const fn one_to_one_inverse(
        name: &'static str,
        target: &'static str,
        remote_key: &'static str,
    ) -> Self {
        Self::new(name, target, RelationKind::OneToOneInverse).remote_key(remote_key)
    }

    /// One-to-many relation; each target row stores `remote_key`.
    #[must_use]
    pub const fn one_to_many(
        name: &'static str,
        target: &'static str,
        remote_key: &'static str,
    ) -> Self {
        Self::new(name, target, RelationKind::OneToMany).remote_key(remote_key)
    }

    /// Set the local foreign key column.
    #[must_use]
    pub const fn local_key(mut self, key: &'static str) -> Self {
        self.local_key = Some(key);
        self
    }

    /// Set the remote foreign key column.
    #[must_use]
    pub const fn remote_key(mut self, key: &'static str) -> Self {
        self.remote_key = Some(key);
        self
    }

    /// Set the relation on the target describing the other end.
    #[must_use]
    pub const fn inverse_side(mut self, name: &'static str) -> Self {
        self.inverse_side = Some(name);
        self
    }

    /// Set cascade flags.
    #[must_use]
    pub const fn cascade(mut self, cascade: Cascade) -> Self {
        self.cascade = cascade;
        self
    }

    #[must_use]
    pub const fn is_many_to_one(&self) -> bool {
        matches!(self.kind, RelationKind::ManyToOne)
    }

    #[must_use]
    pub const fn is_one_to_one_owner(&self) -> bool {
        matches!(self.kind, RelationKind::OneToOneOwner)
    }

    #[must_use]
    pub const fn is_one_to_one_not_owner(&self) -> bool {
        matches!(self.kind, RelationKind::OneToOneInverse)
    }

    #[must_use]
    pub const fn is_one_to_many(&self) -> bool {
        matches!(self.kind, RelationKind::OneToMany)
    }

    #[must_use]
    pub const fn is_cascade_insert(&self) -> bool {
        self.cascade.insert
    }

    #[must_use]
    pub const fn is_cascade_update(&self) -> bool {
        self.cascade.update
    }

    #[must_use]
    pub const fn is_cascade_remove(&self) -> bool {
        self.cascade.remove
    }

    /// The foreign key this relation stores on `row`'s own table.
    ///
    /// `None` for inverse relations, when the column is absent, or when it is
    /// NULL (no link stored).
    #[must_use]
    pub fn own_relation_id<'r>(&self, row: &'r Row) -> Option<&'r Value> {
        if !self.kind.is_owner_side() {
            return None;
        }
        row.get_by_name(self.local_key?).filter(|v| !v.is_null())
    }

    /// The key a related `row` stores pointing back at the declaring entity.
    #[must_use]
    pub fn inverse_relation_id<'r>(&self, row: &'r Row) -> Option<&'r Value> {
        if self.kind.is_owner_side() {
            return None;
        }
        row.get_by_name(self.remote_key?).filter(|v| !v.is_null())
    }

    /// Is `value` a reference to an entity that exists in `graph`?
    #[must_use]
    pub fn is_entity_defined(&self, graph: &EntityGraph, value: &RelationValue) -> bool {
        match value {
            RelationValue::One(id) => graph.get(*id).is_some(),
            RelationValue::Many(ids) => ids.iter().any(|id| graph.get(*id).is_some()),
            RelationValue::Unset | RelationValue::Null => false,
        }
    }
}

impl Default for RelationInfo {
    fn default() -> Self {
        Self::new("", "", RelationKind::default())
    }
}
