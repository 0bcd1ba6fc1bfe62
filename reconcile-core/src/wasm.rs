//! Browser facade - JSON in, JSON out
//!
//! Editors in the admin front end drive a [`NestedCollection`] through this
//! wrapper. Inputs and outputs are JSON strings; failures come back as
//! `{"ok": false, "error": "..."}` instead of throwing.
//!
//! # Example (JavaScript)
//!
//! ```javascript
//! const lines = new CollectionEditor();
//! lines.load_snapshot(JSON.stringify(quotation.lines), 'id');
//! lines.set_measure('{"kind":"product","fields":["quantity","unit_price"]}');
//!
//! const { key } = JSON.parse(lines.add('{"quantity":1,"unit_price":"9.90"}'));
//! lines.edit_existing(key, '{"quantity":2}');
//! lines.toggle_removed('17');
//!
//! render(JSON.parse(lines.effective_view()), lines.total());
//!
//! // On submit
//! const diff = JSON.parse(lines.to_payload());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;

use crate::aggregate::Measure;
use crate::collection::NestedCollection;
use crate::error::{LedgerError, Result};
use crate::identity::{LocalKey, RecordId, RowRef};
use crate::snapshot::{FieldSet, Snapshot};

/// Outcome of a mutating call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpResult {
    pub ok: bool,
    /// Draft key handed out by `add`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Tombstone state after the call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OpResult {
    fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }
}

fn respond(result: Result<OpResult>) -> String {
    let outcome = result.unwrap_or_else(|e| OpResult {
        ok: false,
        error: Some(e.to_string()),
        ..Default::default()
    });
    serde_json::to_string(&outcome).unwrap_or_else(|_| r#"{"ok":false}"#.to_string())
}

fn parse_fields(json: &str, what: &str) -> Result<FieldSet> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(fields) => Ok(fields),
        _ => Err(LedgerError::NotAnObject(what.to_string())),
    }
}

/// One child collection under edit, exposed to JavaScript.
#[wasm_bindgen]
pub struct CollectionEditor {
    inner: NestedCollection,
    measure: Option<Measure>,
}

#[wasm_bindgen]
impl CollectionEditor {
    /// Create an editor over an empty collection.
    #[wasm_bindgen(constructor)]
    pub fn new() -> CollectionEditor {
        CollectionEditor {
            inner: NestedCollection::default(),
            measure: None,
        }
    }

    /// Install server rows as the confirmed snapshot. Clears pending changes.
    #[wasm_bindgen]
    pub fn load_snapshot(&mut self, rows_json: &str, id_field: &str) -> String {
        respond(Snapshot::from_json_str(rows_json, id_field).map(|snapshot| {
            self.inner.install_snapshot(snapshot);
            OpResult::ok()
        }))
    }

    /// Set how totals are computed, e.g. `{"kind":"field","field":"value"}`.
    #[wasm_bindgen]
    pub fn set_measure(&mut self, measure_json: &str) -> String {
        respond(
            serde_json::from_str::<Measure>(measure_json)
                .map_err(LedgerError::from)
                .map(|measure| {
                    self.measure = Some(measure);
                    OpResult::ok()
                }),
        )
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a new row. The result carries its draft key.
    #[wasm_bindgen]
    pub fn add(&mut self, fields_json: &str) -> String {
        respond(
            parse_fields(fields_json, "new row")
                .and_then(|fields| self.inner.add(fields))
                .map(|key| OpResult {
                    key: Some(key.to_string()),
                    ..OpResult::ok()
                }),
        )
    }

    /// Drop an added row. False if the key is unknown or malformed.
    #[wasm_bindgen]
    pub fn remove_added(&mut self, key: &str) -> bool {
        match key.parse::<LocalKey>() {
            Ok(key) => self.inner.remove_added(key),
            Err(_) => false,
        }
    }

    /// Patch a row: a server id edits a confirmed row, a draft key an added one.
    #[wasm_bindgen]
    pub fn edit_existing(&mut self, row: &str, patch_json: &str) -> String {
        respond(self.try_edit(row, patch_json))
    }

    #[wasm_bindgen]
    pub fn mark_removed(&mut self, row: &str) -> String {
        respond(self.try_set_removed(row, true))
    }

    #[wasm_bindgen]
    pub fn unmark_removed(&mut self, row: &str) -> String {
        respond(self.try_set_removed(row, false))
    }

    /// Flip the tombstone of a confirmed row; the result carries the new state.
    #[wasm_bindgen]
    pub fn toggle_removed(&mut self, row: &str) -> String {
        respond(
            RowRef::parse(row)
                .and_then(|row| self.inner.undo().toggle_removed(row))
                .map(|removed| OpResult {
                    removed: Some(removed),
                    ..OpResult::ok()
                }),
        )
    }

    /// Drop pending edits of a confirmed row.
    #[wasm_bindgen]
    pub fn revert(&mut self, id: &str) -> bool {
        match RecordId::parse(id) {
            Ok(id) => self.inner.undo().revert(&id),
            Err(_) => false,
        }
    }

    /// Throw away every pending change.
    #[wasm_bindgen]
    pub fn discard(&mut self) {
        self.inner.discard();
    }

    // =========================================================================
    // Projections
    // =========================================================================

    /// Effective rows as a JSON array.
    #[wasm_bindgen]
    pub fn effective_view(&self) -> String {
        serde_json::to_string(&self.inner.effective_view()).unwrap_or_else(|_| "[]".to_string())
    }

    /// Total as an exact decimal string ("0" when no measure is set).
    #[wasm_bindgen]
    pub fn total(&self) -> String {
        match &self.measure {
            Some(measure) => self.inner.total(measure).to_string(),
            None => "0".to_string(),
        }
    }

    /// Total, row counts and per-row values as JSON. Without a measure there
    /// is nothing to total and an error object is returned.
    #[wasm_bindgen]
    pub fn summary(&self) -> String {
        let Some(measure) = &self.measure else {
            return respond(Err(LedgerError::NoMeasure));
        };
        serde_json::to_string(&self.inner.summarize(measure)).unwrap_or_else(|_| "{}".to_string())
    }

    /// Submit diff: `{"add":[...],"update":[...],"delete_ids":[...]}`.
    #[wasm_bindgen]
    pub fn to_payload(&self) -> String {
        serde_json::to_string(&self.inner.to_payload())
            .unwrap_or_else(|_| r#"{"add":[],"update":[],"delete_ids":[]}"#.to_string())
    }

    #[wasm_bindgen]
    pub fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }
}

impl CollectionEditor {
    fn try_edit(&mut self, row: &str, patch_json: &str) -> Result<OpResult> {
        let row = RowRef::parse(row)?;
        let patch = parse_fields(patch_json, "patch")?;
        self.inner.edit(row, patch)?;
        Ok(OpResult::ok())
    }

    fn try_set_removed(&mut self, row: &str, removed: bool) -> Result<OpResult> {
        let row = RowRef::parse(row)?;
        if removed {
            self.inner.mark_removed(row.clone())?;
        } else {
            self.inner.unmark_removed(row.clone())?;
        }
        let state = match &row {
            RowRef::Confirmed(id) => self.inner.ledger().is_removed(id),
            RowRef::Draft(_) => false,
        };
        Ok(OpResult {
            removed: Some(state),
            ..OpResult::ok()
        })
    }
}

impl Default for CollectionEditor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(json: String) -> OpResult {
        serde_json::from_str(&json).unwrap()
    }

    fn editor() -> CollectionEditor {
        let mut editor = CollectionEditor::new();
        let loaded = editor.load_snapshot(
            r#"[{"id": 1, "quantity": 2, "unit_price": "10.00"}, {"id": 2, "quantity": 1, "unit_price": "5.00"}]"#,
            "id",
        );
        assert!(result(loaded).ok);
        assert!(result(editor.set_measure(r#"{"kind":"product","fields":["quantity","unit_price"]}"#)).ok);
        editor
    }

    #[test]
    fn test_js_flow() {
        let mut editor = editor();
        assert_eq!(editor.total(), "25.00");

        let added = result(editor.add(r#"{"quantity": 3, "unit_price": "2.00"}"#));
        let key = added.key.unwrap();
        assert!(key.starts_with("draft-"));

        assert_eq!(result(editor.toggle_removed("2")).removed, Some(true));
        assert!(result(editor.edit_existing("1", r#"{"quantity": 5}"#)).ok);
        assert_eq!(editor.total(), "56.00");

        let payload: Value = serde_json::from_str(&editor.to_payload()).unwrap();
        assert_eq!(payload["delete_ids"], json!([2]));
        assert_eq!(payload["update"][0]["quantity"], json!(5));
        assert_eq!(payload["add"], json!([{"quantity": 3, "unit_price": "2.00"}]));

        assert!(editor.remove_added(&key));
        assert!(!editor.remove_added(&key));
        assert_eq!(result(editor.toggle_removed("2")).removed, Some(false));
        assert!(editor.revert("1"));
        assert!(!editor.is_dirty());
    }

    #[test]
    fn test_errors_are_reported_not_thrown() {
        let mut editor = editor();

        let bad = result(editor.edit_existing("404", r#"{"quantity": 1}"#));
        assert!(!bad.ok);
        assert!(bad.error.unwrap().contains("404"));

        assert!(!result(editor.add("[1, 2]")).ok);
        assert!(!result(editor.add("not json")).ok);
        assert!(!result(editor.mark_removed("draft-0")).ok);
        assert!(!result(editor.load_snapshot(r#"[{"id": 1}, {"id": "1"}]"#, "id")).ok);
        assert!(!result(editor.set_measure(r#"{"kind":"median"}"#)).ok);
        assert!(!editor.remove_added("17"));
        assert!(!editor.revert(""));
    }

    #[test]
    fn test_view_and_summary_json() {
        let mut editor = editor();
        editor.mark_removed("1");

        let view: Value = serde_json::from_str(&editor.effective_view()).unwrap();
        assert_eq!(view[0]["row"], json!(1));
        assert_eq!(view[0]["is_removed"], json!(true));

        let summary: Value = serde_json::from_str(&editor.summary()).unwrap();
        assert_eq!(summary["total"], json!("5.00"));
        assert_eq!(summary["removed_rows"], json!(1));
    }

    #[test]
    fn test_payload_keys_updates_by_id_field() {
        let mut editor = CollectionEditor::new();
        let loaded = editor.load_snapshot(r#"[{"line_id": 7, "id": "legacy", "quantity": 1}]"#, "line_id");
        assert!(result(loaded).ok);
        assert!(result(editor.edit_existing("7", r#"{"quantity": 2}"#)).ok);

        let payload = editor.to_payload();
        assert_eq!(payload.matches("\"id\"").count(), 1);
        let payload: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(payload["update"], json!([{"line_id": 7, "id": "legacy", "quantity": 2}]));
    }

    #[test]
    fn test_total_without_measure() {
        let editor = CollectionEditor::new();
        assert_eq!(editor.total(), "0");

        // No competing total from a fallback measure
        let summary = result(editor.summary());
        assert!(!summary.ok);
        assert!(summary.error.unwrap().contains("measure"));

        assert_eq!(editor.to_payload(), r#"{"add":[],"update":[],"delete_ids":[]}"#);
    }
}
