use crate::error::StoreResult;
use crate::record::{Attributes, Record, RecordId};
use crate::relation::RelationInfo;

/// Whether store observers fire for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Events {
    Fire,
    Suppress,
}

/// Request to build and persist records from a factory template.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub entity: String,
    /// Named template; `None` selects the default one.
    pub template: Option<String>,
    pub overrides: Attributes,
    pub count: usize,
}

impl BuildRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            template: None,
            overrides: Attributes::new(),
            count: 1,
        }
    }

    pub fn template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }

    pub fn overrides(mut self, overrides: Attributes) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

/// A record changed by a relate operation.
///
/// `record` is the persisted state after linking; `before` holds its
/// attributes prior to linking (empty for rows the link itself inserted).
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub record: Record,
    pub before: Attributes,
    /// The link inserted `record` (pivot rows) rather than updating it.
    pub inserted: bool,
}

/// Persistence capability the concept engine drives.
///
/// Methods take `&self`: implementations behave like a connection handle and
/// manage their own interior state.
pub trait RecordStore {
    /// Build `request.count` records from a template and persist them.
    fn build(&self, request: &BuildRequest) -> StoreResult<Vec<Record>>;

    fn find(&self, id: &RecordId) -> StoreResult<Option<Record>>;

    /// Persist new attribute values for an existing record.
    fn update(&self, id: &RecordId, attributes: &Attributes, events: Events)
    -> StoreResult<Record>;

    /// Delete a record; returns `false` when it no longer exists.
    fn delete(&self, id: &RecordId, events: Events) -> StoreResult<bool>;

    /// Remove every pivot row that references the record; returns how many.
    fn detach_all(&self, id: &RecordId, events: Events) -> StoreResult<usize>;

    /// Link `related` to `root` through `relation` and report what changed.
    fn relate(
        &self,
        root: &Record,
        related: &Record,
        relation: &RelationInfo,
        events: Events,
    ) -> StoreResult<Vec<Mutation>>;
}

/// Reports relation metadata for entity types.
pub trait RelationIntrospector {
    fn relation(&self, entity: &str, name: &str) -> Option<RelationInfo>;
}
