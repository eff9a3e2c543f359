//! Write-ahead ledger of record mutations made during one generation run.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use conceptgen_core::{Attributes, Events, Mutation, Record, RecordId, RecordStore, StoreError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// One logged mutation.
///
/// An empty `before` marks a record that did not exist before the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Action {
    pub record: RecordId,
    pub before: Attributes,
    pub after: Attributes,
}

impl Action {
    pub fn is_creation(&self) -> bool {
        self.before.is_empty()
    }
}

/// Outcome of a rollback.
///
/// When a replay step fails, `rollback` returns the error and the actions not
/// yet undone (the failing one included) stay in the log for a retry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    pub restored: usize,
    pub deleted: usize,
    /// Records that were already gone when their action was replayed.
    pub missing: usize,
}

/// Shared handle to the action ledger of a run.
///
/// Clones point at the same ledger, so nested engines append to the log of
/// the top-level invocation.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    actions: Rc<RefCell<Vec<Action>>>,
    /// Records that did not exist before the run.
    created: Rc<RefCell<BTreeSet<RecordId>>>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log the change from `before` to `after` for `record`.
    ///
    /// Missing sides default to the record's original and dirty attributes.
    /// Only changed columns are kept; returns whether an action was appended.
    pub fn add_action(
        &self,
        record: &Record,
        before: Option<&Attributes>,
        after: Option<&Attributes>,
    ) -> bool {
        let dirty;
        let after = match after {
            Some(after) => after,
            None => {
                dirty = record.dirty();
                &dirty
            }
        };
        let before = before.unwrap_or(&record.original);

        let changed: Attributes = after
            .iter()
            .filter(|(column, value)| before.get(*column) != Some(*value))
            .map(|(column, value)| (column.clone(), value.clone()))
            .collect();
        let previous: Attributes = changed
            .keys()
            .filter_map(|column| {
                before
                    .get(column)
                    .map(|value| (column.clone(), value.clone()))
            })
            .collect();

        if changed == previous {
            return false;
        }

        debug!(
            record = %record.id(),
            columns = changed.len(),
            creation = previous.is_empty(),
            "action logged"
        );
        if previous.is_empty() {
            self.mark_created(record.id());
        }
        self.actions.borrow_mut().push(Action {
            record: record.id(),
            before: previous,
            after: changed,
        });
        true
    }

    /// Log the result of linking two records.
    ///
    /// A record that existed before the run gets the columns the link added
    /// recorded as null, so rollback restores it instead of deleting it.
    pub fn add_link(&self, mutation: &Mutation) -> bool {
        let record = &mutation.record;
        if mutation.inserted || self.is_created(&record.id()) {
            return self.add_action(record, Some(&mutation.before), Some(&record.attributes));
        }

        let mut before = mutation.before.clone();
        for column in record.attributes.keys() {
            before.entry(column.clone()).or_insert(Value::Null);
        }
        self.add_action(record, Some(&before), Some(&record.attributes))
    }

    /// Remember that `id` was created during this run, even before it is logged.
    pub fn mark_created(&self, id: RecordId) {
        self.created.borrow_mut().insert(id);
    }

    pub fn is_created(&self, id: &RecordId) -> bool {
        self.created.borrow().contains(id)
    }

    pub fn actions(&self) -> Vec<Action> {
        self.actions.borrow().clone()
    }

    pub fn set_actions(&self, actions: Vec<Action>) {
        *self.actions.borrow_mut() = actions;
    }

    /// Return every logged action and clear the ledger.
    pub fn flush_actions(&self) -> Vec<Action> {
        std::mem::take(&mut *self.actions.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.actions.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.borrow().is_empty()
    }

    /// Undo every logged action, newest first, with store events suppressed.
    ///
    /// Updated records get their previous values back; created records have
    /// their pivot rows detached and are deleted. On success the ledger is
    /// empty; on failure it keeps the actions that were not undone.
    pub fn rollback(&self, store: &dyn RecordStore) -> Result<RollbackReport, StoreError> {
        let actions = self.flush_actions();
        let mut report = RollbackReport::default();

        for (index, action) in actions.iter().enumerate().rev() {
            if let Err(err) = replay(store, action, &mut report) {
                warn!(
                    record = %action.record,
                    pending = index + 1,
                    error = %err,
                    "rollback interrupted"
                );
                self.set_actions(actions[..=index].to_vec());
                return Err(err);
            }
        }
        self.created.borrow_mut().clear();

        info!(
            actions = actions.len(),
            restored = report.restored,
            deleted = report.deleted,
            missing = report.missing,
            "rollback completed"
        );
        Ok(report)
    }
}

fn replay(
    store: &dyn RecordStore,
    action: &Action,
    report: &mut RollbackReport,
) -> Result<(), StoreError> {
    if action.is_creation() {
        store.detach_all(&action.record, Events::Suppress)?;
        if store.delete(&action.record, Events::Suppress)? {
            report.deleted += 1;
        } else {
            report.missing += 1;
        }
        return Ok(());
    }

    match store.update(&action.record, &action.before, Events::Suppress) {
        Ok(_) => report.restored += 1,
        Err(StoreError::NotFound(id)) => {
            warn!(record = %id, "record missing during rollback");
            report.missing += 1;
        }
        Err(err) => return Err(err),
    }
    Ok(())
}
