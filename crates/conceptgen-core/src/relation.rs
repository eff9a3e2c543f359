use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of association between two entity types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Foreign key lives on the root.
    BelongsTo,
    /// Foreign key lives on the related record.
    HasOne,
    HasMany,
    /// Linked through a pivot table.
    BelongsToMany,
    /// Foreign key plus type column on the related record.
    MorphOne,
    MorphMany,
    /// Pivot table with a type column.
    MorphToMany,
    /// Read-only relations reached through an intermediate entity.
    HasOneThrough,
    HasManyThrough,
}

impl RelationKind {
    /// True when the relation produces a collection of related records.
    pub fn is_many(self) -> bool {
        matches!(
            self,
            RelationKind::HasMany
                | RelationKind::BelongsToMany
                | RelationKind::MorphMany
                | RelationKind::MorphToMany
                | RelationKind::HasManyThrough
        )
    }

    /// True when linking writes the foreign key onto the related record.
    pub fn writes_related(self) -> bool {
        matches!(
            self,
            RelationKind::HasOne
                | RelationKind::HasMany
                | RelationKind::MorphOne
                | RelationKind::MorphMany
        )
    }

    /// True when linking inserts a pivot row instead of writing a foreign key.
    pub fn uses_pivot(self) -> bool {
        matches!(self, RelationKind::BelongsToMany | RelationKind::MorphToMany)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::HasOne => "has_one",
            RelationKind::HasMany => "has_many",
            RelationKind::BelongsToMany => "belongs_to_many",
            RelationKind::MorphOne => "morph_one",
            RelationKind::MorphMany => "morph_many",
            RelationKind::MorphToMany => "morph_to_many",
            RelationKind::HasOneThrough => "has_one_through",
            RelationKind::HasManyThrough => "has_many_through",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pivot table used by many-to-many relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotInfo {
    pub table: String,
    /// Column holding the root key.
    pub foreign_pivot_key: String,
    /// Column holding the related key.
    pub related_pivot_key: String,
}

/// Metadata reported by a relation introspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub name: String,
    pub kind: RelationKind,
    /// Entity type of the related records.
    pub target: String,
    pub foreign_key: String,
    /// Column written into morph relations to record the owner type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub morph_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<PivotInfo>,
}

impl RelationInfo {
    pub fn new(
        name: impl Into<String>,
        kind: RelationKind,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            target: target.into(),
            foreign_key: foreign_key.into(),
            morph_type: None,
            pivot: None,
        }
    }

    pub fn with_morph_type(mut self, column: impl Into<String>) -> Self {
        self.morph_type = Some(column.into());
        self
    }

    pub fn with_pivot(mut self, pivot: PivotInfo) -> Self {
        self.pivot = Some(pivot);
        self
    }

    pub fn is_many(&self) -> bool {
        self.kind.is_many()
    }
}
