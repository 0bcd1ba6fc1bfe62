//! Reconcile Core - Nested child-collection editing engine
//!
//! Parent records in the back office (accounts, clients, quotations, sales
//! orders, payment terms) embed child collections: social links, line items,
//! installment lines. Editors let a user add, edit, delete and restore those
//! children locally and commit everything in one request.
//!
//! Compiled to WebAssembly for the admin front end and used natively by
//! `editor-sdk`.
//!
//! # Pieces
//! - [`Snapshot`] - confirmed server rows, loaded once per session
//! - [`MutationLedger`] - Added / Modified / Removed pending changes
//! - [`reconcile`] - effective view and minimal submit diff
//! - [`aggregate`] - exact decimal totals over the effective view
//! - [`UndoController`] - toggle tombstones, revert edits
//! - [`NestedCollection`] - snapshot + ledger with address-space routing
//!
//! # Example
//! ```rust
//! use reconcile_core::{Measure, NestedCollection, RecordId, Snapshot};
//! use serde_json::json;
//!
//! let rows = [json!({"id": 1, "qty": 2, "price": 10}), json!({"id": 2, "qty": 1, "price": 5})];
//! let mut lines = NestedCollection::new(Snapshot::from_rows(&rows, "id").unwrap());
//!
//! lines.mark_removed(RecordId::from(2u64)).unwrap();
//! lines.add(json!({"qty": 3, "price": 2}).as_object().cloned().unwrap()).unwrap();
//!
//! assert_eq!(lines.total(&Measure::product("qty", "price")).to_string(), "26");
//! assert_eq!(lines.to_payload().delete_ids, vec![RecordId::from(2u64)]);
//! ```

pub mod aggregate;
pub mod amount;
pub mod collection;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod reconcile;
pub mod snapshot;
pub mod undo;
pub mod wasm;


pub use aggregate::{LineValue, Measure, Summary};
pub use amount::Amount;
pub use collection::{NestedCollection, RowState};
pub use error::{LedgerError, Result};
pub use identity::{LocalKey, RecordId, RowRef, DRAFT_PREFIX};
pub use ledger::{AddedChild, MutationLedger};
pub use reconcile::{effective_view, to_payload, ChildDiff, EffectiveRow, UpdateEntry};
pub use snapshot::{ConfirmedChild, FieldSet, Snapshot, DEFAULT_ID_FIELD};
pub use undo::UndoController;
pub use wasm::{CollectionEditor, OpResult};
