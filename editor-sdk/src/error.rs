//! Error types for edit sessions

use reconcile_core::LedgerError;
use thiserror::Error;

use crate::traits::ValidationErrors;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    /// A collection operation was refused by the engine
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Validator rejected the draft; nothing was sent
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Backend call failed; pending changes are untouched
    #[error("Transport error: {0}")]
    Transport(String),

    /// Backend did not answer in time; whether it applied the payload is unknown
    #[error("Submit timed out after {0}ms")]
    Timeout(u64),

    /// Edits and new submits wait for the outstanding submit
    #[error("A submit is already in flight")]
    SubmitInFlight,

    /// Changes were committed but the refetch failed; reload before editing
    #[error("Session is stale, reload the record before editing")]
    Stale,

    #[error("No submit is in flight")]
    NoSubmitInFlight,

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SessionError {
    /// True if resending the same payload is safe. A timeout is not: the
    /// backend may have applied the first attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SessionError {
    fn from(err: serde_yaml::Error) -> Self {
        SessionError::Config(err.to_string())
    }
}
