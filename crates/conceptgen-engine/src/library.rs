//! Library of records created during a generation run, keyed by alias.

use conceptgen_core::{Record, RecordId};
use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::Serialize;
use tracing::debug;

/// One related record or an ordered collection of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolved {
    Single(Record),
    Many(Vec<Record>),
}

impl Resolved {
    /// Build from a record list: one record stays scalar unless `many` is set.
    pub fn from_records(mut records: Vec<Record>, many: bool) -> Option<Self> {
        match (records.len(), many) {
            (0, false) => None,
            (1, false) => records.pop().map(Resolved::Single),
            (_, false) => Some(Resolved::Many(records)),
            (_, true) => Some(Resolved::Many(records)),
        }
    }

    pub fn records(&self) -> &[Record] {
        match self {
            Resolved::Single(record) => std::slice::from_ref(record),
            Resolved::Many(records) => records,
        }
    }

    pub fn records_mut(&mut self) -> &mut [Record] {
        match self {
            Resolved::Single(record) => std::slice::from_mut(record),
            Resolved::Many(records) => records,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Resolved::Single(record) => vec![record],
            Resolved::Many(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Resolved::Many(_))
    }

    pub fn first(&self) -> Option<&Record> {
        self.records().first()
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.records().iter().map(Record::id).collect()
    }

    /// Shape the value for a relation's cardinality.
    ///
    /// Scalars become one-element collections for many-relations; a
    /// collection offered to a single relation yields its first record.
    pub fn coerce(self, many: bool) -> Option<Self> {
        match (self, many) {
            (Resolved::Single(record), true) => Some(Resolved::Many(vec![record])),
            (Resolved::Many(mut records), false) => {
                if records.is_empty() {
                    None
                } else {
                    Some(Resolved::Single(records.swap_remove(0)))
                }
            }
            (value, _) => Some(value),
        }
    }

    /// Append another value, turning the result into a collection.
    ///
    /// Records already held are replaced by the incoming snapshot instead of
    /// being listed twice.
    pub fn extend(self, other: Resolved) -> Self {
        let mut records = self.into_records();
        for record in other.into_records() {
            match records
                .iter_mut()
                .find(|held| held.entity == record.entity && held.key == record.key)
            {
                Some(held) => *held = record,
                None => records.push(record),
            }
        }
        Resolved::Many(records)
    }

    /// Replace held snapshots with newer persisted states of the same records.
    pub fn refresh(&mut self, record: &Record) {
        for held in self.records_mut() {
            if held.entity == record.entity && held.key == record.key {
                *held = record.clone();
            }
        }
    }
}

/// Ordered alias→record mapping shared across nested concept engines.
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ModelLibrary {
    entries: IndexMap<String, Resolved>,
}

impl ModelLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, alias: &str) -> Option<&Resolved> {
        self.entries.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.entries.contains_key(alias)
    }

    /// Store a value under `alias`, returning what it replaced.
    pub fn insert(&mut self, alias: impl Into<String>, value: Resolved) -> Option<Resolved> {
        let alias = alias.into();
        let previous = self.entries.insert(alias.clone(), value);
        if previous.is_some() {
            debug!(alias = %alias, "library entry replaced");
        }
        previous
    }

    /// Add records under `alias`, growing an existing entry into a collection.
    pub fn accumulate(&mut self, alias: impl Into<String>, value: Resolved) {
        match self.entries.entry(alias.into()) {
            Entry::Occupied(mut entry) => {
                let current = std::mem::replace(entry.get_mut(), Resolved::Many(Vec::new()));
                *entry.get_mut() = current.extend(value);
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
            }
        }
    }

    pub fn remove(&mut self, alias: &str) -> Option<Resolved> {
        self.entries.shift_remove(alias)
    }

    /// Union with another library; incoming values win on alias collisions.
    pub fn merge(&mut self, other: ModelLibrary) {
        for (alias, value) in other.entries {
            self.entries.insert(alias, value);
        }
    }

    /// Copy every entry so the result shares nothing with `self`.
    pub fn deep_copy(&self) -> Self {
        let entries = self
            .entries
            .iter()
            .map(|(alias, value)| {
                let copied = match value {
                    Resolved::Single(record) => Resolved::Single(record.clone()),
                    Resolved::Many(records) => Resolved::Many(records.to_vec()),
                };
                (alias.clone(), copied)
            })
            .collect();
        Self { entries }
    }

    /// Update every held snapshot of `record` to its latest persisted state.
    pub fn refresh(&mut self, record: &Record) {
        for value in self.entries.values_mut() {
            value.refresh(record);
        }
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Resolved)> {
        self.entries.iter().map(|(alias, value)| (alias.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries that are absent from `baseline` or hold a different value there.
    pub fn difference(&self, baseline: &ModelLibrary) -> ModelLibrary {
        let entries = self
            .entries
            .iter()
            .filter(|(alias, value)| baseline.get(alias) != Some(*value))
            .map(|(alias, value)| (alias.clone(), value.clone()))
            .collect();
        Self { entries }
    }
}

impl IntoIterator for ModelLibrary {
    type Item = (String, Resolved);
    type IntoIter = indexmap::map::IntoIter<String, Resolved>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Clone for ModelLibrary {
    fn clone(&self) -> Self {
        self.deep_copy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conceptgen_core::Attributes;
    use serde_json::json;

    fn record(entity: &str, key: u64) -> Record {
        Record::new(entity, key, Attributes::new())
    }

    #[test]
    fn coerce_wraps_scalars_for_many_relations() {
        let value = Resolved::Single(record("Pet", 1)).coerce(true).expect("value");
        assert_eq!(value, Resolved::Many(vec![record("Pet", 1)]));

        let value = Resolved::Many(vec![record("Pet", 1), record("Pet", 2)])
            .coerce(false)
            .expect("value");
        assert_eq!(value, Resolved::Single(record("Pet", 1)));

        assert!(Resolved::Many(Vec::new()).coerce(false).is_none());
    }

    #[test]
    fn merge_prefers_incoming_values() {
        let mut library = ModelLibrary::new();
        library.insert("owner", Resolved::Single(record("Person", 1)));
        library.insert("pet", Resolved::Single(record("Pet", 1)));

        let mut incoming = ModelLibrary::new();
        incoming.insert("owner", Resolved::Single(record("Person", 2)));
        incoming.insert("tag", Resolved::Single(record("Tag", 1)));

        library.merge(incoming);

        assert_eq!(library.len(), 3);
        assert_eq!(
            library.get("owner").and_then(Resolved::first).map(|r| r.key),
            Some(2)
        );
        assert_eq!(library.aliases().collect::<Vec<_>>(), ["owner", "pet", "tag"]);
    }

    #[test]
    fn accumulate_grows_collections() {
        let mut library = ModelLibrary::new();
        library.accumulate("pets", Resolved::Single(record("Pet", 1)));
        library.accumulate("pets", Resolved::Many(vec![record("Pet", 2), record("Pet", 3)]));

        let pets = library.get("pets").expect("pets");
        assert!(pets.is_many());
        assert_eq!(pets.len(), 3);
    }

    #[test]
    fn deep_copy_is_independent() {
        let mut library = ModelLibrary::new();
        library.insert("pet", Resolved::Single(record("Pet", 1)));

        let copy = library.clone();
        let mut renamed = record("Pet", 1);
        renamed.set("name", json!("Rex"));
        library.refresh(&renamed);

        assert_eq!(
            library.get("pet").and_then(Resolved::first).and_then(|r| r.get("name")),
            Some(&json!("Rex"))
        );
        assert!(
            copy.get("pet")
                .and_then(Resolved::first)
                .and_then(|r| r.get("name"))
                .is_none()
        );
    }
}
