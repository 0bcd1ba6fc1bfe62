//! Nested collection - one snapshot bound to one ledger
//!
//! This is where a [`RowRef`] is routed to the right address space and where
//! confirmed identifiers are checked against the snapshot. A lookup either
//! finds the row or reports that it did not; nothing falls through to
//! "append as new".

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::aggregate::{self, Measure, Summary};
use crate::amount::Amount;
use crate::error::{LedgerError, Result};
use crate::identity::{LocalKey, RecordId, RowRef};
use crate::ledger::{carries_identifier, MutationLedger};
use crate::reconcile::{self, ChildDiff, EffectiveRow};
use crate::snapshot::{FieldSet, Snapshot};
use crate::undo::UndoController;

/// Pending-change flags of a confirmed child. The two flags are orthogonal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RowState {
    pub is_modified: bool,
    pub is_removed: bool,
}

/// A child collection under edit.
#[derive(Debug, Clone, Default)]
pub struct NestedCollection {
    snapshot: Snapshot,
    ledger: MutationLedger,
}

impl NestedCollection {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            ledger: MutationLedger::new(),
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn ledger(&self) -> &MutationLedger {
        &self.ledger
    }

    // =========================================================================
    // Added children
    // =========================================================================

    /// Create a new child. The fields must not carry a server identifier.
    pub fn add(&mut self, fields: FieldSet) -> Result<LocalKey> {
        self.reject_identifier(&fields)?;
        let key = self.ledger.add(fields);
        tracing::debug!("Added draft row {}", key);
        Ok(key)
    }

    /// Remove an added child outright. No-op (false) if the key is unknown.
    pub fn remove_added(&mut self, key: LocalKey) -> bool {
        let removed = self.ledger.remove_added(key);
        if removed {
            tracing::debug!("Removed draft row {}", key);
        }
        removed
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Apply a patch to any row, routed by address space.
    pub fn edit(&mut self, row: impl Into<RowRef>, patch: FieldSet) -> Result<()> {
        match row.into() {
            RowRef::Confirmed(id) => self.edit_existing(&id, patch),
            RowRef::Draft(key) => self.edit_draft(key, patch),
        }
    }

    /// Merge a patch into a confirmed child's pending changes.
    pub fn edit_existing(&mut self, id: &RecordId, patch: FieldSet) -> Result<()> {
        self.reject_identifier(&patch)?;
        let Some(base) = self.snapshot.get(id) else {
            tracing::error!("Edit addressed to unknown record {}", id);
            return Err(LedgerError::UnknownRecord(id.clone()));
        };
        self.ledger.edit_confirmed(base, patch);
        tracing::debug!(modified = self.ledger.is_modified(id), "Edited record {}", id);
        Ok(())
    }

    /// Mutate an added child's fields in place.
    pub fn edit_draft(&mut self, key: LocalKey, patch: FieldSet) -> Result<()> {
        self.reject_identifier(&patch)?;
        self.ledger.edit_added(key, patch).map_err(|e| {
            tracing::error!("Edit addressed to unknown draft row {}", key);
            e
        })?;
        tracing::debug!("Edited draft row {}", key);
        Ok(())
    }

    /// Drop pending edits for a confirmed child. Returns false if there were none.
    pub fn revert(&mut self, id: &RecordId) -> bool {
        let reverted = self.ledger.revert(id);
        if reverted {
            tracing::debug!("Reverted record {}", id);
        }
        reverted
    }

    // =========================================================================
    // Tombstones
    // =========================================================================

    /// Mark a confirmed child for deletion.
    ///
    /// An identifier missing from the snapshot is ignored (`Ok(false)`) so a
    /// late snapshot refresh cannot turn a click into an error. A draft key is
    /// a caller bug: added rows are removed with [`Self::remove_added`].
    pub fn mark_removed(&mut self, row: impl Into<RowRef>) -> Result<bool> {
        let id = self.confirmed_only(row.into(), "mark_removed")?;
        if !self.snapshot.contains(&id) {
            tracing::warn!("Ignoring mark_removed for unknown record {}", id);
            return Ok(false);
        }
        let marked = self.ledger.mark_removed(id.clone());
        tracing::debug!("Marked record {} for deletion", id);
        Ok(marked)
    }

    /// Restore a confirmed child marked for deletion.
    pub fn unmark_removed(&mut self, row: impl Into<RowRef>) -> Result<bool> {
        let id = self.confirmed_only(row.into(), "unmark_removed")?;
        if !self.snapshot.contains(&id) {
            tracing::warn!("Ignoring unmark_removed for unknown record {}", id);
            return Ok(false);
        }
        let unmarked = self.ledger.unmark_removed(&id);
        tracing::debug!("Restored record {}", id);
        Ok(unmarked)
    }

    /// Undo controls for this collection.
    pub fn undo(&mut self) -> UndoController<'_> {
        UndoController::new(self)
    }

    // =========================================================================
    // Projections
    // =========================================================================

    pub fn effective_view(&self) -> Vec<EffectiveRow> {
        reconcile::effective_view(&self.snapshot, &self.ledger)
    }

    pub fn to_payload(&self) -> ChildDiff {
        reconcile::to_payload(&self.snapshot, &self.ledger)
    }

    pub fn total(&self, measure: &Measure) -> Amount {
        aggregate::total(&self.effective_view(), measure)
    }

    pub fn summarize(&self, measure: &Measure) -> Summary {
        aggregate::summarize(&self.effective_view(), measure)
    }

    /// Flags of a confirmed child, or `None` if it is not in the snapshot.
    pub fn row_state(&self, id: &RecordId) -> Option<RowState> {
        self.snapshot.contains(id).then(|| RowState {
            is_modified: self.ledger.is_modified(id),
            is_removed: self.ledger.is_removed(id),
        })
    }

    /// True if anything is pending.
    pub fn is_dirty(&self) -> bool {
        !self.ledger.is_empty()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Throw away all pending changes.
    pub fn discard(&mut self) {
        self.ledger.reset();
        tracing::debug!("Discarded pending changes");
    }

    /// Replace the snapshot with fresh server truth and clear the ledger.
    pub fn install_snapshot(&mut self, snapshot: Snapshot) {
        tracing::debug!(rows = snapshot.len(), "Installed confirmed snapshot");
        self.snapshot = snapshot;
        self.ledger.reset();
    }

    fn reject_identifier(&self, fields: &FieldSet) -> Result<()> {
        let id_field = self.snapshot.id_field();
        if carries_identifier(fields, id_field) {
            tracing::error!("Child fields carry identifier field '{}'", id_field);
            return Err(LedgerError::IdentifierInFields(id_field.to_string()));
        }
        Ok(())
    }

    fn confirmed_only(&self, row: RowRef, operation: &'static str) -> Result<RecordId> {
        match row {
            RowRef::Confirmed(id) => Ok(id),
            RowRef::Draft(key) => {
                tracing::error!("{} called with draft key {}", operation, key);
                Err(LedgerError::WrongKeySpace {
                    operation,
                    key: key.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ConfirmedChild;
    use serde_json::{json, Value};

    fn fields(value: Value) -> FieldSet {
        value.as_object().cloned().unwrap()
    }

    fn id(n: u64) -> RecordId {
        RecordId::from(n)
    }

    fn quote_lines() -> NestedCollection {
        NestedCollection::new(
            Snapshot::new(vec![
                ConfirmedChild::new(1u64, fields(json!({"qty": 2, "price": 10}))),
                ConfirmedChild::new(2u64, fields(json!({"qty": 1, "price": 5}))),
            ])
            .unwrap(),
        )
    }

    fn measure() -> Measure {
        Measure::product("qty", "price")
    }

    #[test]
    fn test_scenario_remove_add_edit_restore() {
        let mut lines = quote_lines();

        // A: tombstone row 2, add a new line
        lines.mark_removed(id(2)).unwrap();
        lines.add(fields(json!({"qty": 3, "price": 2}))).unwrap();
        assert_eq!(lines.total(&measure()), Amount::from(26));
        assert_eq!(
            serde_json::to_value(lines.to_payload()).unwrap(),
            json!({"add": [{"qty": 3, "price": 2}], "update": [], "delete_ids": [2]})
        );

        // B: edit row 1
        lines.edit_existing(&id(1), fields(json!({"qty": 5}))).unwrap();
        assert_eq!(lines.total(&measure()), Amount::from(56));
        assert_eq!(
            serde_json::to_value(lines.to_payload()).unwrap(),
            json!({
                "add": [{"qty": 3, "price": 2}],
                "update": [{"id": 1, "qty": 5, "price": 10}],
                "delete_ids": [2]
            })
        );

        // C: restore row 2
        lines.unmark_removed(id(2)).unwrap();
        assert!(lines.to_payload().delete_ids.is_empty());
        assert_eq!(lines.total(&measure()), Amount::from(61));
    }

    #[test]
    fn test_edit_routes_by_address_space() {
        let mut lines = quote_lines();
        let key = lines.add(fields(json!({"qty": 1, "price": 1}))).unwrap();

        lines.edit(key, fields(json!({"qty": 4}))).unwrap();
        lines.edit(id(1), fields(json!({"price": 11}))).unwrap();

        // Draft edits go straight into the added row, not into Modified
        assert_eq!(lines.ledger().modified_count(), 1);
        assert_eq!(lines.ledger().added_child(key).unwrap().fields["qty"], json!(4));
        assert_eq!(lines.total(&measure()), Amount::from(22 + 5 + 4));
    }

    #[test]
    fn test_unknown_rows_never_become_new_rows() {
        let mut lines = quote_lines();

        let err = lines.edit_existing(&id(99), fields(json!({"qty": 1}))).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownRecord(_)));

        let err = lines.edit(LocalKey::new(42), fields(json!({"qty": 1}))).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownDraft(_)));

        assert!(!lines.is_dirty());
        assert!(lines.to_payload().add.is_empty());
    }

    #[test]
    fn test_string_ids_address_numeric_rows() {
        let mut lines = quote_lines();
        let as_string = RecordId::parse("2").unwrap();

        lines.edit_existing(&as_string, fields(json!({"qty": 3}))).unwrap();
        assert_eq!(lines.to_payload().update.len(), 1);
        assert!(lines.to_payload().add.is_empty());
    }

    #[test]
    fn test_tombstones_only_for_confirmed_rows() {
        let mut lines = quote_lines();
        let key = lines.add(FieldSet::new()).unwrap();

        let err = lines.mark_removed(key).unwrap_err();
        assert!(matches!(err, LedgerError::WrongKeySpace { .. }));
        let err = lines.unmark_removed(key).unwrap_err();
        assert!(matches!(err, LedgerError::WrongKeySpace { .. }));

        // Unknown confirmed ids are tolerated
        assert!(!lines.mark_removed(id(77)).unwrap());
        assert!(lines.to_payload().delete_ids.is_empty());
    }

    #[test]
    fn test_identifier_field_rejected_in_new_rows_and_patches() {
        let mut lines = quote_lines();

        let err = lines.add(fields(json!({"id": 5, "qty": 1}))).unwrap_err();
        assert!(matches!(err, LedgerError::IdentifierInFields(_)));

        let err = lines.edit_existing(&id(1), fields(json!({"id": 2}))).unwrap_err();
        assert!(matches!(err, LedgerError::IdentifierInFields(_)));

        // A null id (blank form field) is not an identifier
        assert!(lines.add(fields(json!({"id": null, "qty": 1}))).is_ok());
    }

    #[test]
    fn test_removed_added_row_leaves_no_trace() {
        let mut lines = quote_lines();
        let key = lines.add(fields(json!({"qty": 3, "price": 2}))).unwrap();
        assert!(lines.remove_added(key));

        assert!(lines.to_payload().is_empty());
        assert!(!lines.is_dirty());
        assert_eq!(lines.effective_view().len(), 2);
    }

    #[test]
    fn test_row_state_flags_are_orthogonal() {
        let mut lines = quote_lines();
        assert_eq!(lines.row_state(&id(1)), Some(RowState::default()));
        assert_eq!(lines.row_state(&id(9)), None);

        lines.edit_existing(&id(1), fields(json!({"qty": 8}))).unwrap();
        lines.mark_removed(id(1)).unwrap();
        assert_eq!(
            lines.row_state(&id(1)),
            Some(RowState {
                is_modified: true,
                is_removed: true
            })
        );

        lines.unmark_removed(id(1)).unwrap();
        assert_eq!(
            lines.row_state(&id(1)),
            Some(RowState {
                is_modified: true,
                is_removed: false
            })
        );
    }

    #[test]
    fn test_install_snapshot_resets_ledger() {
        let mut lines = quote_lines();
        lines.mark_removed(id(1)).unwrap();
        let key = lines.add(fields(json!({"qty": 1, "price": 1}))).unwrap();

        let fresh = Snapshot::from_rows(
            &[json!({"id": 2, "qty": 1, "price": 5}), json!({"id": 3, "qty": 1, "price": 1})],
            "id",
        )
        .unwrap();
        lines.install_snapshot(fresh);

        assert!(!lines.is_dirty());
        assert_eq!(lines.total(&measure()), Amount::from(6));

        // Keys keep counting after a reset
        let next = lines.add(FieldSet::new()).unwrap();
        assert!(next > key);
    }

    #[test]
    fn test_discard() {
        let mut lines = quote_lines();
        lines.edit_existing(&id(2), fields(json!({"price": 6}))).unwrap();
        lines.discard();
        assert!(!lines.is_dirty());
        assert_eq!(lines.total(&measure()), Amount::from(25));
    }
}
