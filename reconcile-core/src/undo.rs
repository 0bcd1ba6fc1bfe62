//! Undo controller - per-row undo within one edit session
//!
//! Holds no state: every call delegates to the collection's ledger.
//! Added rows have no undo; removing one is final.

use crate::collection::NestedCollection;
use crate::error::Result;
use crate::identity::{RecordId, RowRef};

/// Borrowed view over a collection exposing the undo operations.
pub struct UndoController<'a> {
    collection: &'a mut NestedCollection,
}

impl<'a> UndoController<'a> {
    pub(crate) fn new(collection: &'a mut NestedCollection) -> Self {
        Self { collection }
    }

    /// Mark or unmark a confirmed row depending on its current membership.
    ///
    /// Returns the new `is_removed` value. Unknown identifiers stay unmarked.
    pub fn toggle_removed(&mut self, row: impl Into<RowRef>) -> Result<bool> {
        let row = row.into();
        let currently_removed = match &row {
            RowRef::Confirmed(id) => self.collection.ledger().is_removed(id),
            RowRef::Draft(_) => false,
        };
        if currently_removed {
            self.collection.unmark_removed(row)?;
            Ok(false)
        } else {
            Ok(self.collection.mark_removed(row)?)
        }
    }

    /// Restore the confirmed fields of a row by dropping its patch.
    pub fn revert(&mut self, id: &RecordId) -> bool {
        self.collection.revert(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::snapshot::{ConfirmedChild, FieldSet, Snapshot};
    use serde_json::{json, Value};

    fn fields(value: Value) -> FieldSet {
        value.as_object().cloned().unwrap()
    }

    fn links() -> NestedCollection {
        NestedCollection::new(
            Snapshot::new(vec![
                ConfirmedChild::new(10u64, fields(json!({"platform": "x", "url": "https://x.com/a"}))),
                ConfirmedChild::new(11u64, fields(json!({"platform": "gh", "url": "https://github.com/a"}))),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn test_toggle_twice_restores_view() {
        let mut links = links();
        let before = links.effective_view();

        assert!(links.undo().toggle_removed(RecordId::from(10u64)).unwrap());
        assert!(links.effective_view()[0].is_removed);

        assert!(!links.undo().toggle_removed(RecordId::from(10u64)).unwrap());
        assert_eq!(links.effective_view(), before);
    }

    #[test]
    fn test_toggle_unknown_id_stays_unmarked() {
        let mut links = links();
        assert!(!links.undo().toggle_removed(RecordId::from(99u64)).unwrap());
        assert!(!links.is_dirty());
    }

    #[test]
    fn test_toggle_draft_is_rejected() {
        let mut links = links();
        let key = links.add(fields(json!({"platform": "web"}))).unwrap();
        let err = links.undo().toggle_removed(key).unwrap_err();
        assert!(matches!(err, LedgerError::WrongKeySpace { .. }));
    }

    #[test]
    fn test_revert_restores_confirmed_fields() {
        let mut links = links();
        let id = RecordId::from(11u64);
        let before = links.effective_view();

        links
            .edit_existing(&id, fields(json!({"url": "https://github.com/b"})))
            .unwrap();
        assert_ne!(links.effective_view(), before);

        assert!(links.undo().revert(&id));
        assert_eq!(links.effective_view(), before);
        assert!(!links.undo().revert(&id));
    }
}
