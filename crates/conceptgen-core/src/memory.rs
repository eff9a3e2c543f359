use std::cell::{RefCell, RefMut};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::DEFAULT_TEMPLATE;
use crate::error::{PersistenceCode, StoreError, StoreResult, TemplateSource};
use crate::record::{Attributes, Record, RecordId};
use crate::relation::{RelationInfo, RelationKind};
use crate::store::{BuildRequest, Events, Mutation, RecordStore, RelationIntrospector};

/// Placeholder expanded to the record sequence number in template strings.
const SEQUENCE_PLACEHOLDER: &str = "{n}";

/// Column-level constraints checked on every write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Constraints for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRules {
    #[serde(default)]
    pub unique: Vec<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnRules>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    Updated,
    Deleted,
    Linked,
    Detached,
}

/// Observer notification emitted by the store when events are not suppressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    pub kind: EventKind,
    pub record: RecordId,
}

#[derive(Debug, Clone)]
struct Template {
    attributes: Attributes,
    location: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    templates: BTreeMap<String, BTreeMap<String, Template>>,
    rules: BTreeMap<String, EntityRules>,
    relations: BTreeMap<String, BTreeMap<String, RelationInfo>>,
    records: BTreeMap<RecordId, Record>,
    sequences: BTreeMap<String, u64>,
    events: Vec<StoreEvent>,
}

/// In-memory record store, factory and relation introspector.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RefCell<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory template for an entity.
    pub fn define(
        &mut self,
        entity: &str,
        name: &str,
        attributes: Attributes,
        location: impl Into<String>,
    ) -> &mut Self {
        self.state
            .get_mut()
            .templates
            .entry(entity.to_string())
            .or_default()
            .insert(
                name.to_string(),
                Template {
                    attributes,
                    location: location.into(),
                },
            );
        self
    }

    pub fn define_rules(&mut self, entity: &str, rules: EntityRules) -> &mut Self {
        self.state.get_mut().rules.insert(entity.to_string(), rules);
        self
    }

    pub fn define_relation(&mut self, entity: &str, relation: RelationInfo) -> &mut Self {
        self.state
            .get_mut()
            .relations
            .entry(entity.to_string())
            .or_default()
            .insert(relation.name.clone(), relation);
        self
    }

    /// Persist a record without going through a template.
    pub fn insert(&self, entity: &str, attributes: Attributes) -> StoreResult<Record> {
        let mut state = self.state();
        let key = next_key(&mut state, entity);
        check_constraints(&state, entity, key, &attributes).map_err(|(code, message)| {
            StoreError::Persistence {
                code,
                entity: entity.to_string(),
                message,
                source_template: None,
            }
        })?;
        let record = Record::new(entity, key, attributes);
        state.records.insert(record.id(), record.clone());
        emit(&mut state, Events::Fire, EventKind::Created, record.id());
        Ok(record)
    }

    /// All records of an entity in key order.
    pub fn records(&self, entity: &str) -> Vec<Record> {
        self.state()
            .records
            .values()
            .filter(|record| record.entity == entity)
            .cloned()
            .collect()
    }

    pub fn count(&self, entity: &str) -> usize {
        self.state()
            .records
            .keys()
            .filter(|id| id.entity == entity)
            .count()
    }

    pub fn total_records(&self) -> usize {
        self.state().records.len()
    }

    /// Observer notifications emitted so far.
    pub fn events(&self) -> Vec<StoreEvent> {
        self.state().events.clone()
    }

    pub fn template_names(&self, entity: &str) -> Vec<String> {
        self.state()
            .templates
            .get(entity)
            .map(|templates| templates.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn state(&self) -> RefMut<'_, MemoryState> {
        self.state.borrow_mut()
    }
}

impl RecordStore for MemoryStore {
    fn build(&self, request: &BuildRequest) -> StoreResult<Vec<Record>> {
        let mut state = self.state();
        let name = request.template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let templates = state
            .templates
            .get(&request.entity)
            .ok_or_else(|| StoreError::UnknownEntity(request.entity.clone()))?;
        let template = templates
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownTemplate {
                entity: request.entity.clone(),
                template: name.to_string(),
            })?;

        let mut built = Vec::with_capacity(request.count);
        for _ in 0..request.count {
            let key = next_key(&mut state, &request.entity);
            let mut attributes = expand_template(&template.attributes, key);
            attributes.extend(request.overrides.clone());

            check_constraints(&state, &request.entity, key, &attributes).map_err(
                |(code, message)| StoreError::Persistence {
                    code,
                    entity: request.entity.clone(),
                    message,
                    source_template: Some(TemplateSource {
                        entity: request.entity.clone(),
                        name: name.to_string(),
                        location: template.location.clone(),
                    }),
                },
            )?;

            let record = Record::new(request.entity.clone(), key, attributes);
            state.records.insert(record.id(), record.clone());
            emit(&mut state, Events::Fire, EventKind::Created, record.id());
            built.push(record);
        }

        debug!(
            entity = %request.entity,
            template = name,
            count = built.len(),
            "records built"
        );
        Ok(built)
    }

    fn find(&self, id: &RecordId) -> StoreResult<Option<Record>> {
        Ok(self.state().records.get(id).cloned())
    }

    fn update(
        &self,
        id: &RecordId,
        attributes: &Attributes,
        events: Events,
    ) -> StoreResult<Record> {
        let mut state = self.state();
        let current = state
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let mut merged = current.attributes;
        merged.extend(attributes.clone());
        check_constraints(&state, &id.entity, id.key, &merged).map_err(|(code, message)| {
            StoreError::Persistence {
                code,
                entity: id.entity.clone(),
                message,
                source_template: None,
            }
        })?;

        let record = Record::new(id.entity.clone(), id.key, merged);
        state.records.insert(id.clone(), record.clone());
        emit(&mut state, events, EventKind::Updated, id.clone());
        Ok(record)
    }

    fn delete(&self, id: &RecordId, events: Events) -> StoreResult<bool> {
        let mut state = self.state();
        let removed = state.records.remove(id).is_some();
        if removed {
            emit(&mut state, events, EventKind::Deleted, id.clone());
        }
        Ok(removed)
    }

    fn detach_all(&self, id: &RecordId, events: Events) -> StoreResult<usize> {
        let mut state = self.state();
        let key = Value::from(id.key);
        let mut pivot_rows = Vec::new();

        for (owner, relations) in &state.relations {
            for relation in relations.values() {
                let Some(pivot) = relation.pivot.as_ref() else {
                    continue;
                };
                let column = if *owner == id.entity {
                    &pivot.foreign_pivot_key
                } else if relation.target == id.entity {
                    &pivot.related_pivot_key
                } else {
                    continue;
                };
                for row in state.records.values() {
                    if row.entity == pivot.table && row.get(column) == Some(&key) {
                        pivot_rows.push(row.id());
                    }
                }
            }
        }

        pivot_rows.sort();
        pivot_rows.dedup();
        for row in &pivot_rows {
            state.records.remove(row);
            emit(&mut state, events, EventKind::Detached, row.clone());
        }
        Ok(pivot_rows.len())
    }

    fn relate(
        &self,
        root: &Record,
        related: &Record,
        relation: &RelationInfo,
        events: Events,
    ) -> StoreResult<Vec<Mutation>> {
        let mut state = self.state();
        let unsupported = || StoreError::UnsupportedRelationKind {
            entity: root.entity.clone(),
            relation: relation.name.clone(),
            kind: relation.kind,
        };

        let mutation = match relation.kind {
            RelationKind::BelongsTo => write_columns(
                &mut state,
                &root.id(),
                [(relation.foreign_key.clone(), Value::from(related.key))],
            )?,
            RelationKind::HasOne | RelationKind::HasMany => write_columns(
                &mut state,
                &related.id(),
                [(relation.foreign_key.clone(), Value::from(root.key))],
            )?,
            RelationKind::MorphOne | RelationKind::MorphMany => {
                let morph_type = morph_type_column(relation);
                write_columns(
                    &mut state,
                    &related.id(),
                    [
                        (relation.foreign_key.clone(), Value::from(root.key)),
                        (morph_type, Value::from(root.entity.clone())),
                    ],
                )?
            }
            RelationKind::BelongsToMany | RelationKind::MorphToMany => {
                let pivot = relation.pivot.as_ref().ok_or_else(unsupported)?;
                let mut row = Attributes::new();
                row.insert(pivot.foreign_pivot_key.clone(), Value::from(root.key));
                row.insert(pivot.related_pivot_key.clone(), Value::from(related.key));
                if relation.kind == RelationKind::MorphToMany {
                    row.insert(
                        morph_type_column(relation),
                        Value::from(root.entity.clone()),
                    );
                }

                let exists = state
                    .records
                    .values()
                    .any(|existing| existing.entity == pivot.table && existing.attributes == row);
                if exists {
                    return Err(StoreError::DuplicateLink {
                        root: root.id(),
                        related: related.id(),
                        relation: relation.name.clone(),
                    });
                }

                let key = next_key(&mut state, &pivot.table);
                let record = Record::new(pivot.table.clone(), key, row);
                state.records.insert(record.id(), record.clone());
                Mutation {
                    record,
                    before: Attributes::new(),
                    inserted: true,
                }
            }
            RelationKind::HasOneThrough | RelationKind::HasManyThrough => {
                return Err(unsupported());
            }
        };

        emit(&mut state, events, EventKind::Linked, mutation.record.id());
        debug!(
            root = %root.id(),
            related = %related.id(),
            relation = %relation.name,
            kind = %relation.kind,
            "records linked"
        );
        Ok(vec![mutation])
    }
}

impl RelationIntrospector for MemoryStore {
    fn relation(&self, entity: &str, name: &str) -> Option<RelationInfo> {
        self.state()
            .relations
            .get(entity)
            .and_then(|relations| relations.get(name))
            .cloned()
    }
}

fn next_key(state: &mut MemoryState, entity: &str) -> u64 {
    let sequence = state.sequences.entry(entity.to_string()).or_insert(0);
    *sequence += 1;
    *sequence
}

fn emit(state: &mut MemoryState, events: Events, kind: EventKind, record: RecordId) {
    if events == Events::Fire {
        state.events.push(StoreEvent { kind, record });
    }
}

fn write_columns<const N: usize>(
    state: &mut MemoryState,
    id: &RecordId,
    columns: [(String, Value); N],
) -> StoreResult<Mutation> {
    let current = state
        .records
        .get(id)
        .cloned()
        .ok_or_else(|| StoreError::NotFound(id.clone()))?;
    let before = current.attributes.clone();
    let mut attributes = current.attributes;
    attributes.extend(columns);

    let record = Record::new(id.entity.clone(), id.key, attributes);
    state.records.insert(id.clone(), record.clone());
    Ok(Mutation {
        record,
        before,
        inserted: false,
    })
}

fn morph_type_column(relation: &RelationInfo) -> String {
    relation.morph_type.clone().unwrap_or_else(|| {
        let stem = relation
            .foreign_key
            .strip_suffix("_id")
            .unwrap_or(&relation.foreign_key);
        format!("{stem}_type")
    })
}

fn expand_template(attributes: &Attributes, key: u64) -> Attributes {
    attributes
        .iter()
        .map(|(column, value)| {
            let value = match value {
                Value::String(text) if text.contains(SEQUENCE_PLACEHOLDER) => {
                    Value::String(text.replace(SEQUENCE_PLACEHOLDER, &key.to_string()))
                }
                other => other.clone(),
            };
            (column.clone(), value)
        })
        .collect()
}

fn check_constraints(
    state: &MemoryState,
    entity: &str,
    key: u64,
    attributes: &Attributes,
) -> Result<(), (PersistenceCode, String)> {
    let Some(rules) = state.rules.get(entity) else {
        return Ok(());
    };

    for (column, column_rules) in &rules.columns {
        let Some(value) = attributes.get(column) else {
            continue;
        };
        if let (Some(max_length), Some(text)) = (column_rules.max_length, value.as_str()) {
            if text.chars().count() > max_length {
                return Err((
                    PersistenceCode::StringTooLong,
                    format!("value for '{column}' exceeds {max_length} characters"),
                ));
            }
        }
        if let Some(number) = value.as_f64() {
            let below = column_rules.min.is_some_and(|min| number < min);
            let above = column_rules.max.is_some_and(|max| number > max);
            if below || above {
                return Err((
                    PersistenceCode::NumericOutOfRange,
                    format!("value {number} for '{column}' is out of range"),
                ));
            }
        }
    }

    for column in &rules.unique {
        let Some(value) = attributes.get(column).filter(|value| !value.is_null()) else {
            continue;
        };
        let duplicate = state.records.values().any(|record| {
            record.entity == entity && record.key != key && record.get(column) == Some(value)
        });
        if duplicate {
            return Err((
                PersistenceCode::UniqueViolation,
                format!("duplicate value for unique column '{column}'"),
            ));
        }
    }

    Ok(())
}
