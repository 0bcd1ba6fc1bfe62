//! Backend trait for reading and writing parent records

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// A parent record as the backend returns it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParentRecord {
    /// Scalar fields of the parent (name, dates, totals, ...)
    pub fields: Map<String, Value>,
    /// Child rows per collection name, each row carrying its id field
    #[serde(default)]
    pub children: HashMap<String, Vec<Value>>,
}

impl ParentRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            children: HashMap::new(),
        }
    }

    pub fn with_children(mut self, name: impl Into<String>, rows: Vec<Value>) -> Self {
        self.children.insert(name.into(), rows);
        self
    }

    /// Rows of one collection; a missing collection reads as empty.
    pub fn rows(&self, name: &str) -> &[Value] {
        self.children.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// What the backend reports after applying a payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmitReceipt {
    /// Backend-assigned revision or timestamp, if any
    #[serde(default)]
    pub revision: Option<String>,
    /// Human readable message from the backend
    #[serde(default)]
    pub message: Option<String>,
}

/// Record backend used by an edit session.
///
/// Implementations wrap the HTTP API of the admin backend. Failures are
/// reported as `SessionError::Transport`; the session never retries on its own.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Load a parent record with all its child collections.
    async fn fetch_parent(&self, parent_id: &str) -> Result<ParentRecord>;

    /// Apply a payload to a parent record in one request.
    async fn submit(&self, parent_id: &str, payload: &Value) -> Result<SubmitReceipt>;
}
