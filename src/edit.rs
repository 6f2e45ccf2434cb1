use thiserror::Error;
use tracing::{debug, warn};

use crate::derive::{AppliedEdit, RowPatch, apply_patches};
use crate::stat_event::{Field, StatEvent};
use crate::store::EventStore;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("invalid value {value:?} for {field}")]
    Validation { field: Field, value: String },
    #[error("row {0} is no longer in the log")]
    RowNotFound(String),
    #[error("could not save edit: {message}")]
    Persistence {
        message: String,
        /// Prior values for every write that did not land.
        rollback: Vec<RowPatch>,
    },
}

impl EditError {
    pub fn rollback(&self) -> &[RowPatch] {
        match self {
            EditError::Persistence { rollback, .. } => rollback,
            _ => &[],
        }
    }
}

/// Write the edited cell, then the cascade in concurrent batches.
///
/// A failed primary write rolls back the whole edit and skips the cascade.
/// A failed cascade write rolls back only the fields that did not land.
pub fn persist_edit(
    store: &dyn EventStore,
    edit: &AppliedEdit,
    batch_size: usize,
) -> Result<(), EditError> {
    if let Err(err) = store.patch_event(&edit.primary) {
        warn!(row = %edit.row_id, field = %edit.field, error = %err, "primary write failed");
        return Err(EditError::Persistence {
            message: err.to_string(),
            rollback: edit.prior.clone(),
        });
    }

    if edit.cascade.is_empty() {
        return Ok(());
    }
    debug!(
        row = %edit.row_id,
        patches = edit.cascade.len(),
        "writing cascade"
    );
    let failures = store.patch_events(&edit.cascade, batch_size);
    if failures.is_empty() {
        return Ok(());
    }

    let message = format!(
        "{} of {} follow-up writes failed ({})",
        failures.len(),
        edit.cascade.len(),
        failures[0].error
    );
    warn!(row = %edit.row_id, "{message}");
    let rollback = failures
        .iter()
        .map(|f| edit.prior_for(&f.patch))
        .filter(|p| !p.is_empty())
        .collect();
    Err(EditError::Persistence { message, rollback })
}

/// Restore prior values onto the latest log, not the pre-edit snapshot,
/// so later local changes on untouched fields survive.
pub fn rollback(log: &[StatEvent], prior: &[RowPatch]) -> Vec<StatEvent> {
    apply_patches(log, prior)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derive::{EditOutcome, apply_edit};
    use crate::stat_event::Roster;
    use crate::store::testing::ScriptedStore;

    fn log() -> Vec<StatEvent> {
        (1..=4)
            .map(|i| StatEvent {
                id: format!("r{i}"),
                set: Some(1),
                rally_id: Some(1),
                our_score: Some(0),
                opp_score: Some(0),
                import_seq: i as f64,
                ..StatEvent::default()
            })
            .collect()
    }

    fn edit_first_row() -> AppliedEdit {
        match apply_edit(&log(), "r1", crate::stat_event::Field::Result, "w", &Roster::default()) {
            Ok(EditOutcome::Applied(edit)) => edit,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn successful_persist_writes_primary_first() {
        let store = ScriptedStore::default();
        let edit = edit_first_row();
        persist_edit(&store, &edit, 2).unwrap();

        let attempted = store.attempted_ids();
        assert_eq!(attempted[0], "r1");
        assert_eq!(attempted.len(), 1 + edit.cascade.len());
    }

    #[test]
    fn failed_primary_rolls_back_everything() {
        let store = ScriptedStore::failing(["r1"]);
        let edit = edit_first_row();
        let err = persist_edit(&store, &edit, 15).unwrap_err();

        assert_eq!(store.attempted_ids().len(), 1);
        let restored = rollback(&edit.log, err.rollback());
        assert_eq!(restored, log());
    }

    #[test]
    fn failed_cascade_rolls_back_only_failed_rows() {
        let store = ScriptedStore::failing(["r3"]);
        let edit = edit_first_row();
        let err = persist_edit(&store, &edit, 15).unwrap_err();

        assert_eq!(err.rollback().len(), 1);
        assert_eq!(err.rollback()[0].id, "r3");
        let restored = rollback(&edit.log, err.rollback());
        assert_eq!(restored[0].result.as_deref(), Some("Won Point"));
        assert_eq!(restored[2].our_score, Some(0));
        assert_eq!(restored[3].our_score, Some(1));
    }
}
