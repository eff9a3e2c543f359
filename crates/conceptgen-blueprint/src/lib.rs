//! TOML blueprints describing entities, factory templates and concepts.

pub mod assemble;
pub mod errors;
pub mod model;
pub mod validate;

pub use assemble::{Assembly, assemble, concept_definition, load_blueprint};
pub use errors::{BlueprintError, IssueSeverity, Result, ValidationIssue, ValidationReport};
pub use model::{
    Blueprint, ConceptBlueprint, DeclarationBlueprint, EntityBlueprint, HandlerBlueprint,
    RelationBlueprint, TemplateBlueprint,
};
pub use validate::validate_blueprint;
