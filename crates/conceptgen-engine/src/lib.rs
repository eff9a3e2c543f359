//! Concept generation engine.
//!
//! A concept describes a root record plus the relations it must be connected
//! to. [`ConceptEngine`] creates the root, resolves each relation from the
//! model library, a declared handler or the record-store factory, links
//! everything and records each mutation in an [`ActionLog`] that can be
//! rolled back.

pub mod action_log;
pub mod concept;
pub mod definition;
pub mod errors;
pub mod library;
pub mod registry;
pub mod resolver;

pub use action_log::{Action, ActionLog, RollbackReport};
pub use concept::{Backend, ConceptEngine, DEFAULT_MANY_COUNT, ResolvedRelation};
pub use definition::{ConceptDefinition, Handler, Nested, RelationDeclaration};
pub use errors::{ConceptError, Result};
pub use library::{ModelLibrary, Resolved};
pub use registry::ConceptRegistry;
pub use resolver::{Probe, Source, candidate_sources};
