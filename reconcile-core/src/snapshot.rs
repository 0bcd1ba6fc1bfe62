//! Confirmed snapshot - server truth for one child collection
//!
//! Loaded once when the parent record is opened and replaced wholesale after
//! a successful submit. Never mutated in place.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LedgerError, Result};
use crate::identity::RecordId;

/// Editable scalar fields of a child row, keyed by field name.
pub type FieldSet = serde_json::Map<String, Value>;

/// Field holding the server identifier unless configured otherwise.
pub const DEFAULT_ID_FIELD: &str = "id";

/// A persisted child as last fetched from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedChild {
    pub id: RecordId,
    pub fields: FieldSet,
}

impl ConfirmedChild {
    pub fn new(id: impl Into<RecordId>, fields: FieldSet) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Ordered, id-unique list of confirmed children.
#[derive(Debug, Clone)]
pub struct Snapshot {
    children: Vec<ConfirmedChild>,
    index: HashMap<RecordId, usize>,
    id_field: String,
}

impl Snapshot {
    /// Empty snapshot (a parent with no children yet).
    pub fn empty() -> Self {
        Self {
            children: Vec::new(),
            index: HashMap::new(),
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }

    /// Build from already separated children, using the default id field.
    pub fn new(children: Vec<ConfirmedChild>) -> Result<Self> {
        Self::with_id_field(children, DEFAULT_ID_FIELD)
    }

    /// Build from already separated children.
    ///
    /// Rejects duplicate identifiers and children whose fields still carry
    /// the identifier field.
    pub fn with_id_field(children: Vec<ConfirmedChild>, id_field: &str) -> Result<Self> {
        let mut index = HashMap::with_capacity(children.len());
        for (pos, child) in children.iter().enumerate() {
            if child.fields.contains_key(id_field) {
                return Err(LedgerError::IdentifierInFields(id_field.to_string()));
            }
            if index.insert(child.id.clone(), pos).is_some() {
                return Err(LedgerError::DuplicateIdentifier(child.id.clone()));
            }
        }

        Ok(Self {
            children,
            index,
            id_field: id_field.to_string(),
        })
    }

    /// Build from raw server rows, splitting `id_field` out of each row.
    pub fn from_rows(rows: &[Value], id_field: &str) -> Result<Self> {
        let mut children = Vec::with_capacity(rows.len());
        for row in rows {
            let mut fields = row
                .as_object()
                .cloned()
                .ok_or_else(|| LedgerError::NotAnObject("snapshot row".to_string()))?;
            let raw_id = fields
                .remove(id_field)
                .ok_or_else(|| LedgerError::InvalidIdentifier(format!("row without '{}'", id_field)))?;
            children.push(ConfirmedChild {
                id: RecordId::from_json(&raw_id)?,
                fields,
            });
        }
        Self::with_id_field(children, id_field)
    }

    /// Build from a JSON array of server rows.
    pub fn from_json_str(json: &str, id_field: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        match value {
            Value::Array(rows) => Self::from_rows(&rows, id_field),
            _ => Err(LedgerError::NotAnObject("snapshot array".to_string())),
        }
    }

    pub fn get(&self, id: &RecordId) -> Option<&ConfirmedChild> {
        self.index.get(id).map(|&pos| &self.children[pos])
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.index.contains_key(id)
    }

    /// Position of `id` in snapshot order.
    pub fn position(&self, id: &RecordId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfirmedChild> {
        self.children.iter()
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn id_field(&self) -> &str {
        &self.id_field
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_rows_splits_identifier() {
        let rows = vec![
            json!({"id": 1, "qty": 2, "price": 10}),
            json!({"id": "2", "qty": 1, "price": 5}),
        ];
        let snapshot = Snapshot::from_rows(&rows, "id").unwrap();

        assert_eq!(snapshot.len(), 2);
        let second = snapshot.get(&RecordId::from(2u64)).unwrap();
        assert!(!second.fields.contains_key("id"));
        assert_eq!(second.fields["price"], json!(5));
        assert_eq!(snapshot.position(&RecordId::from(1u64)), Some(0));
    }

    #[test]
    fn test_duplicate_identifiers_rejected() {
        // 1 and "01" are the same record once normalised
        let rows = vec![json!({"id": 1}), json!({"id": "01"})];
        let err = Snapshot::from_rows(&rows, "id").unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateIdentifier(_)));
    }

    #[test]
    fn test_custom_id_field() {
        let snapshot =
            Snapshot::from_json_str(r#"[{"line_id": 9, "value": "50"}]"#, "line_id").unwrap();
        assert!(snapshot.contains(&RecordId::from(9u64)));
        assert_eq!(snapshot.id_field(), "line_id");
    }

    #[test]
    fn test_rows_must_be_objects_with_ids() {
        assert!(Snapshot::from_rows(&[json!(3)], "id").is_err());
        assert!(Snapshot::from_rows(&[json!({"qty": 1})], "id").is_err());
        assert!(Snapshot::from_json_str(r#"{"id": 1}"#, "id").is_err());
    }

    #[test]
    fn test_children_may_not_carry_id_field() {
        let mut fields = FieldSet::new();
        fields.insert("id".into(), json!(1));
        let err = Snapshot::new(vec![ConfirmedChild::new(1u64, fields)]).unwrap_err();
        assert!(matches!(err, LedgerError::IdentifierInFields(_)));
    }
}
