//! Pre-submit validation
//!
//! Field rules live outside the engine. A validator sees the draft as the user
//! sees it and either accepts it or returns per-field errors; it never touches
//! pending changes.

use std::collections::BTreeMap;
use std::fmt;

use reconcile_core::EffectiveRow;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Draft state handed to a validator.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DraftView {
    /// Parent fields with pending parent edits applied
    pub parent: Map<String, Value>,
    /// Effective rows per collection name
    pub collections: BTreeMap<String, Vec<EffectiveRow>>,
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field path, e.g. `name` or `lines[draft-1].quantity`
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Every failed rule of one validation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(path, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Errors for one field path.
    pub fn for_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a FieldError> + 'a {
        self.errors.iter().filter(move |e| e.path == path)
    }

    /// `Ok(())` if nothing failed.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.path, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Validator invoked before every submit.
pub trait Validator: Send + Sync {
    fn validate(&self, draft: &DraftView) -> Result<(), ValidationErrors>;
}

/// Validator that accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl Validator for AcceptAll {
    fn validate(&self, _draft: &DraftView) -> Result<(), ValidationErrors> {
        Ok(())
    }
}

/// Requires fields to be present and non-blank.
///
/// Rows marked for deletion are skipped; they are about to disappear.
#[derive(Debug, Clone, Default)]
pub struct RequiredFields {
    parent: Vec<String>,
    children: BTreeMap<String, Vec<String>>,
}

impl RequiredFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent_field(mut self, field: impl Into<String>) -> Self {
        self.parent.push(field.into());
        self
    }

    pub fn child_field(mut self, collection: impl Into<String>, field: impl Into<String>) -> Self {
        self.children
            .entry(collection.into())
            .or_default()
            .push(field.into());
        self
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

impl Validator for RequiredFields {
    fn validate(&self, draft: &DraftView) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for field in &self.parent {
            if is_blank(draft.parent.get(field)) {
                errors.push(field.as_str(), "is required");
            }
        }

        for (collection, fields) in &self.children {
            let Some(rows) = draft.collections.get(collection) else {
                continue;
            };
            for row in rows.iter().filter(|row| !row.is_removed) {
                for field in fields {
                    if is_blank(row.fields.get(field)) {
                        errors.push(format!("{}[{}].{}", collection, row.row, field), "is required");
                    }
                }
            }
        }

        errors.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reconcile_core::{NestedCollection, Snapshot};
    use serde_json::json;

    fn draft() -> DraftView {
        let rows = [
            json!({"id": 1, "quantity": 2, "description": "Desk"}),
            json!({"id": 2, "quantity": null, "description": ""}),
        ];
        let mut lines = NestedCollection::new(Snapshot::from_rows(&rows, "id").unwrap());
        lines
            .add(json!({"quantity": 1, "description": "  "}).as_object().cloned().unwrap())
            .unwrap();

        let mut collections = BTreeMap::new();
        collections.insert("lines".to_string(), lines.effective_view());
        DraftView {
            parent: json!({"name": "Q-104", "notes": null}).as_object().cloned().unwrap(),
            collections,
        }
    }

    #[test]
    fn test_accept_all() {
        assert!(AcceptAll.validate(&draft()).is_ok());
    }

    #[test]
    fn test_required_fields_reports_each_path() {
        let rules = RequiredFields::new()
            .parent_field("name")
            .parent_field("notes")
            .child_field("lines", "quantity")
            .child_field("lines", "description")
            .child_field("payments", "value");

        let errors = rules.validate(&draft()).unwrap_err();
        let paths: Vec<&str> = errors.errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "notes",
                "lines[2].quantity",
                "lines[2].description",
                "lines[draft-0].description",
            ]
        );
        assert_eq!(errors.for_path("notes").count(), 1);
        assert!(errors.to_string().starts_with("notes: is required"));
    }

    #[test]
    fn test_removed_rows_are_not_validated() {
        let mut view = draft();
        for row in view.collections.get_mut("lines").unwrap() {
            row.is_removed = !row.is_new;
        }
        let rules = RequiredFields::new().child_field("lines", "quantity");
        assert!(rules.validate(&view).is_ok());
    }
}
