//! Mutation Ledger - pending, uncommitted changes to one child collection
//!
//! Three independent structures:
//!
//! - **Added** - new children in insertion order, addressed by [`LocalKey`]
//! - **Modified** - field patches keyed by the [`RecordId`] they overlay
//! - **Removed** - identifiers of confirmed children slated for deletion
//!
//! Modified and Removed may name the same identifier at once; the reconciler
//! lets deletion win when building the payload. Added children never enter
//! Modified or Removed.
//!
//! Mutators are crate-private: snapshot membership and address-space routing
//! are enforced by [`crate::NestedCollection`] before anything lands here.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LedgerError, Result};
use crate::identity::{LocalKey, RecordId};
use crate::snapshot::{ConfirmedChild, FieldSet};

/// A child created during this session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddedChild {
    pub key: LocalKey,
    pub fields: FieldSet,
}

/// Pending changes for one collection.
#[derive(Debug, Clone, Default)]
pub struct MutationLedger {
    added: Vec<AddedChild>,
    modified: HashMap<RecordId, FieldSet>,
    removed: HashSet<RecordId>,
    // Survives reset() so keys are never reused within a session
    next_key: u64,
}

impl MutationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Added
    // =========================================================================

    /// Append a new child and hand out a fresh key.
    pub(crate) fn add(&mut self, fields: FieldSet) -> LocalKey {
        let key = LocalKey::new(self.next_key);
        self.next_key += 1;
        self.added.push(AddedChild { key, fields });
        key
    }

    /// Drop an added child outright. Returns false if the key is unknown.
    pub(crate) fn remove_added(&mut self, key: LocalKey) -> bool {
        let before = self.added.len();
        self.added.retain(|child| child.key != key);
        self.added.len() != before
    }

    /// Merge a patch straight into an added child's fields.
    pub(crate) fn edit_added(&mut self, key: LocalKey, patch: FieldSet) -> Result<()> {
        let child = self
            .added
            .iter_mut()
            .find(|child| child.key == key)
            .ok_or(LedgerError::UnknownDraft(key))?;
        child.fields.extend(patch);
        Ok(())
    }

    // =========================================================================
    // Modified
    // =========================================================================

    /// Merge a patch into the Modified entry for `base`.
    ///
    /// Keys set back to their confirmed value are pruned, and an entry left
    /// with no keys is dropped, so the entry only ever holds real changes.
    pub(crate) fn edit_confirmed(&mut self, base: &ConfirmedChild, patch: FieldSet) {
        let entry = self.modified.entry(base.id.clone()).or_default();
        for (name, value) in patch {
            let unchanged = match base.fields.get(&name) {
                Some(original) => *original == value,
                None => value.is_null(),
            };
            if unchanged {
                entry.remove(&name);
            } else {
                entry.insert(name, value);
            }
        }
        if entry.is_empty() {
            self.modified.remove(&base.id);
        }
    }

    /// Drop the Modified entry for `id`. Returns false if there was none.
    pub(crate) fn revert(&mut self, id: &RecordId) -> bool {
        self.modified.remove(id).is_some()
    }

    // =========================================================================
    // Removed
    // =========================================================================

    /// Returns true if `id` was newly marked.
    pub(crate) fn mark_removed(&mut self, id: RecordId) -> bool {
        self.removed.insert(id)
    }

    /// Returns true if `id` was marked before.
    pub(crate) fn unmark_removed(&mut self, id: &RecordId) -> bool {
        self.removed.remove(id)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Clear Added, Modified and Removed.
    pub(crate) fn reset(&mut self) {
        self.added.clear();
        self.modified.clear();
        self.removed.clear();
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn added(&self) -> &[AddedChild] {
        &self.added
    }

    pub fn added_child(&self, key: LocalKey) -> Option<&AddedChild> {
        self.added.iter().find(|child| child.key == key)
    }

    pub fn patch(&self, id: &RecordId) -> Option<&FieldSet> {
        self.modified.get(id)
    }

    pub fn is_modified(&self, id: &RecordId) -> bool {
        self.modified.contains_key(id)
    }

    pub fn is_removed(&self, id: &RecordId) -> bool {
        self.removed.contains(id)
    }

    pub fn modified_count(&self) -> usize {
        self.modified.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Field value after overlaying an optional patch on a base row.
pub(crate) fn overlay(base: &FieldSet, patch: Option<&FieldSet>) -> FieldSet {
    let mut fields = base.clone();
    if let Some(patch) = patch {
        for (name, value) in patch {
            fields.insert(name.clone(), value.clone());
        }
    }
    fields
}

/// True if `fields` carries `id_field` with anything but null.
pub(crate) fn carries_identifier(fields: &FieldSet, id_field: &str) -> bool {
    matches!(fields.get(id_field), Some(v) if !matches!(v, Value::Null))
}
