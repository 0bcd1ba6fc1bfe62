//! Collaborator traits
//!
//! The session talks to the outside world through these: a backend that
//! reads and writes parent records, and an opaque validator run before submit.

mod backend;
mod validator;

pub use backend::{ParentRecord, RecordBackend, SubmitReceipt};
pub use validator::{AcceptAll, DraftView, FieldError, RequiredFields, ValidationErrors, Validator};
