//! Reconciler - overlay the ledger onto the snapshot
//!
//! Two pure projections of (snapshot, ledger):
//!
//! - [`effective_view`] - what the editor shows and what totals are computed
//!   over. Removed rows stay in the view, flagged, so they can be restored.
//! - [`to_payload`] - the minimal create/update/delete instructions sent on
//!   submit. Deletion wins over edit for the same identifier.
//!
//! Both are cheap enough to run on every keystroke and neither touches its
//! inputs.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::identity::{RecordId, RowRef};
use crate::ledger::{overlay, MutationLedger};
use crate::snapshot::{FieldSet, Snapshot};

/// One row of the effective view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveRow {
    /// Server id for confirmed rows, draft key for added rows
    pub row: RowRef,
    /// Base fields overridden by any pending patch
    pub fields: FieldSet,
    /// Row was created in this session
    pub is_new: bool,
    /// Row carries a pending patch
    pub is_modified: bool,
    /// Row is marked for deletion (shown, but excluded from totals)
    pub is_removed: bool,
}

/// Update instruction for one confirmed child.
///
/// Serialises flat, with the identifier under the snapshot's id field:
/// `{"id": 1, "qty": 5, "price": 10}` or `{"line_id": 1, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEntry {
    pub id: RecordId,
    /// Key the identifier is written under
    pub id_field: String,
    pub fields: FieldSet,
}

impl Serialize for UpdateEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(&self.id_field, &self.id)?;
        for (key, value) in &self.fields {
            if key != &self.id_field {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}

/// Minimal diff for one child collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChildDiff {
    /// New children, without their draft keys
    pub add: Vec<FieldSet>,
    /// Edited children not marked for deletion
    pub update: Vec<UpdateEntry>,
    /// Children marked for deletion
    pub delete_ids: Vec<RecordId>,
}

impl ChildDiff {
    /// True when there is nothing to send for this collection.
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.update.is_empty() && self.delete_ids.is_empty()
    }

    /// Number of instructions across all three lists.
    pub fn len(&self) -> usize {
        self.add.len() + self.update.len() + self.delete_ids.len()
    }
}

/// Confirmed rows in snapshot order, then added rows in insertion order.
pub fn effective_view(snapshot: &Snapshot, ledger: &MutationLedger) -> Vec<EffectiveRow> {
    let mut rows = Vec::with_capacity(snapshot.len() + ledger.added().len());

    for child in snapshot.iter() {
        let patch = ledger.patch(&child.id);
        rows.push(EffectiveRow {
            row: RowRef::Confirmed(child.id.clone()),
            fields: overlay(&child.fields, patch),
            is_new: false,
            is_modified: patch.is_some(),
            is_removed: ledger.is_removed(&child.id),
        });
    }

    for added in ledger.added() {
        rows.push(EffectiveRow {
            row: RowRef::Draft(added.key),
            fields: added.fields.clone(),
            is_new: true,
            is_modified: false,
            is_removed: false,
        });
    }

    rows
}

/// Build the submit diff. Total: an empty ledger yields an empty diff.
pub fn to_payload(snapshot: &Snapshot, ledger: &MutationLedger) -> ChildDiff {
    let mut diff = ChildDiff::default();

    for child in snapshot.iter() {
        if ledger.is_removed(&child.id) {
            diff.delete_ids.push(child.id.clone());
        } else if let Some(patch) = ledger.patch(&child.id) {
            diff.update.push(UpdateEntry {
                id: child.id.clone(),
                id_field: snapshot.id_field().to_string(),
                fields: overlay(&child.fields, Some(patch)),
            });
        }
    }

    diff.add = ledger
        .added()
        .iter()
        .map(|added| added.fields.clone())
        .collect();

    diff
}
