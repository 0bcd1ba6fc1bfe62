//! Editor SDK - edit sessions over parent records with child collections
//!
//! Wraps `reconcile-core` for native callers: opens a parent record through a
//! [`RecordBackend`], keeps one [`NestedCollection`] per configured collection,
//! validates the draft and submits a single add/update/delete payload.
//!
//! # Example
//!
//! ```rust,ignore
//! use editor_sdk::{EditSession, EditorConfig, RequiredFields};
//!
//! let mut session = EditSession::open(backend, "Q-104", EditorConfig::for_quotation())
//!     .await?
//!     .with_validator(RequiredFields::new().child_field("lines", "quantity"));
//!
//! session.edit("lines", RecordId::from(1u64), patch)?;
//! let receipt = session.submit().await?;
//! ```

// Collaborator traits (backend, validator)
pub mod traits;

// Session configuration and presets
pub mod config;

// Wire payload shaping
pub mod payload;

// Submit lifecycle
pub mod session;

// Error types
pub mod error;

pub use config::{CollectionProfile, EditorConfig};
pub use error::{Result, SessionError};
pub use payload::build_payload;
pub use session::{EditSession, SessionState};
pub use traits::{
    AcceptAll, DraftView, FieldError, ParentRecord, RecordBackend, RequiredFields, SubmitReceipt,
    ValidationErrors, Validator,
};

// Re-export the engine
pub use reconcile_core::{
    Amount, ChildDiff, EffectiveRow, FieldSet, LocalKey, Measure, NestedCollection, RecordId,
    RowRef, Summary,
};
