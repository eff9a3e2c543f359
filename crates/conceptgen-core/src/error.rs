use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordId;
use crate::relation::RelationKind;

/// Where a factory template was declared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSource {
    /// Entity type the template builds.
    pub entity: String,
    /// Template (state) name.
    pub name: String,
    /// Declaration site, usually `path:line`.
    pub location: String,
}

/// SQLSTATE-style classification of persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceCode {
    /// `22003`
    NumericOutOfRange,
    /// `23000`
    UniqueViolation,
    /// `22001`
    StringTooLong,
    Other(String),
}

impl PersistenceCode {
    pub fn sqlstate(&self) -> &str {
        match self {
            PersistenceCode::NumericOutOfRange => "22003",
            PersistenceCode::UniqueViolation => "23000",
            PersistenceCode::StringTooLong => "22001",
            PersistenceCode::Other(code) => code.as_str(),
        }
    }

    /// True for failures caused by the attribute values a template produced.
    pub fn is_definition_error(&self) -> bool {
        !matches!(self, PersistenceCode::Other(_))
    }
}

impl fmt::Display for PersistenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sqlstate())
    }
}

/// Errors raised by a record store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("persistence error [{code}] on '{entity}': {message}")]
    Persistence {
        code: PersistenceCode,
        entity: String,
        message: String,
        source_template: Option<TemplateSource>,
    },
    #[error("unsupported relation kind '{kind}' for {entity}::{relation}")]
    UnsupportedRelationKind {
        entity: String,
        relation: String,
        kind: RelationKind,
    },
    #[error("{root} is already linked to {related} through '{relation}'")]
    DuplicateLink {
        root: RecordId,
        related: RecordId,
        relation: String,
    },
    #[error("unknown entity '{0}'")]
    UnknownEntity(String),
    #[error("unknown template '{template}' for entity '{entity}'")]
    UnknownTemplate { entity: String, template: String },
    #[error("record {0} not found")]
    NotFound(RecordId),
}

impl StoreError {
    pub fn is_duplicate_link(&self) -> bool {
        matches!(self, StoreError::DuplicateLink { .. })
    }
}

/// Result type for record store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
