use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attribute values of a record, keyed by column name.
pub type Attributes = BTreeMap<String, Value>;

/// Identity of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    pub entity: String,
    pub key: u64,
}

impl RecordId {
    pub fn new(entity: impl Into<String>, key: u64) -> Self {
        Self {
            entity: entity.into(),
            key,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.key)
    }
}

/// Snapshot of a persisted record.
///
/// `original` holds the attributes as last persisted; anything in
/// `attributes` that differs from it is considered dirty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub entity: String,
    pub key: u64,
    pub attributes: Attributes,
    #[serde(default, skip_serializing)]
    pub original: Attributes,
}

impl Record {
    /// Build a clean record whose original state equals its attributes.
    pub fn new(entity: impl Into<String>, key: u64, attributes: Attributes) -> Self {
        Self {
            entity: entity.into(),
            key,
            original: attributes.clone(),
            attributes,
        }
    }

    pub fn id(&self) -> RecordId {
        RecordId::new(self.entity.clone(), self.key)
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.attributes.insert(column.into(), value);
    }

    /// Attributes changed since the record was last persisted.
    pub fn dirty(&self) -> Attributes {
        self.attributes
            .iter()
            .filter(|(column, value)| self.original.get(*column) != Some(*value))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect()
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty().is_empty()
    }

    /// Mark the current attributes as persisted.
    pub fn sync_original(&mut self) {
        self.original = self.attributes.clone();
    }

    pub fn is_instance_of(&self, entity: &str) -> bool {
        self.entity == entity
    }
}
