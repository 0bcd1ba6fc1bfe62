//! Error types for ledger and reconciliation operations

use thiserror::Error;

use crate::identity::{LocalKey, RecordId};

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Ledger error types
///
/// Every variant is recoverable: the ledger is left exactly as it was
/// before the failing call.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Identifier could not be normalised (empty, fractional, draft-prefixed...)
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Snapshot contained the same identifier twice
    #[error("Duplicate identifier in snapshot: {0}")]
    DuplicateIdentifier(RecordId),

    /// Confirmed identifier not present in the snapshot
    #[error("Unknown record: {0}")]
    UnknownRecord(RecordId),

    /// Draft key not present in the added list
    #[error("Unknown draft row: {0}")]
    UnknownDraft(LocalKey),

    /// Operation is only defined for the other address space
    #[error("{operation} is not valid for {key}")]
    WrongKeySpace { operation: &'static str, key: String },

    /// Child fields carried the server identifier field
    #[error("Fields must not carry the identifier field '{0}'")]
    IdentifierInFields(String),

    /// Expected a JSON object
    #[error("Expected a JSON object for {0}")]
    NotAnObject(String),

    /// A total was asked for but no measure is configured
    #[error("No measure set for this collection")]
    NoMeasure,

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
