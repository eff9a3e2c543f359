//! Core contracts for conceptgen.
//!
//! This crate defines the record model, relation metadata and the collaborator
//! traits the concept engine drives, plus an in-memory store that implements
//! all of them for tests and the CLI.

pub mod error;
pub mod memory;
pub mod record;
pub mod relation;
pub mod store;

pub use error::{PersistenceCode, StoreError, StoreResult, TemplateSource};
pub use memory::{ColumnRules, EntityRules, EventKind, MemoryStore, StoreEvent};
pub use record::{Attributes, Record, RecordId};
pub use relation::{PivotInfo, RelationInfo, RelationKind};
pub use store::{BuildRequest, Events, Mutation, RecordStore, RelationIntrospector};

/// Name of the template used when a build request does not name one.
pub const DEFAULT_TEMPLATE: &str = "default";
