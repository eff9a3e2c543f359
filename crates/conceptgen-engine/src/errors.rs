use conceptgen_core::{RelationKind, StoreError};
use thiserror::Error;

/// Errors emitted while generating a concept.
#[derive(Debug, Error)]
pub enum ConceptError {
    /// A factory template produced values that violate a persistence constraint.
    #[error("invalid attributes set by '{entity}' template '{template}' from '{location}'")]
    InvalidDefinition {
        entity: String,
        template: String,
        location: String,
        #[source]
        source: StoreError,
    },
    #[error("unable to resolve relation '{alias}' for concept '{concept}'")]
    UnresolvedRelation { concept: String, alias: String },
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("factory for '{0}' returned no records")]
    EmptyFactory(String),
    #[error("unsupported relation kind '{kind}' for {entity}::{relation}")]
    UnsupportedRelationKind {
        entity: String,
        relation: String,
        kind: RelationKind,
    },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ConceptError {
    /// Translate template-caused persistence failures raised by a factory call.
    ///
    /// `entity` and `template` describe the request that was made; the store's
    /// own source report wins when it has one.
    pub fn from_factory(err: StoreError, entity: &str, template: Option<&str>) -> Self {
        match err {
            StoreError::Persistence {
                ref code,
                ref source_template,
                ..
            } if code.is_definition_error() => {
                let (entity, template, location) = match source_template {
                    Some(source) => (
                        source.entity.clone(),
                        source.name.clone(),
                        source.location.clone(),
                    ),
                    None => (
                        entity.to_string(),
                        template
                            .unwrap_or(conceptgen_core::DEFAULT_TEMPLATE)
                            .to_string(),
                        "<unknown>".to_string(),
                    ),
                };
                ConceptError::InvalidDefinition {
                    entity,
                    template,
                    location,
                    source: err,
                }
            }
            StoreError::UnsupportedRelationKind {
                entity,
                relation,
                kind,
            } => ConceptError::UnsupportedRelationKind {
                entity,
                relation,
                kind,
            },
            other => ConceptError::Store(other),
        }
    }
}

/// Result type for concept generation.
pub type Result<T> = std::result::Result<T, ConceptError>;
