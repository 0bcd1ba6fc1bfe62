//! Edit session - one parent record open in an editor
//!
//! Owns the parent's scalar fields and one [`NestedCollection`] per configured
//! child collection, and runs the submit lifecycle:
//!
//! ```text
//! Editing --begin_submit--> Submitting --complete_submit(Ok)--> Editing (fresh snapshots)
//!    ^                          |   \--complete_submit(Err) or timeout--> Stale --reload--> Editing
//!    \-------abort_submit-------/
//! ```
//!
//! A failed submit leaves every pending change in place so the identical
//! payload can be sent again. While a submit is in flight, after a commit
//! whose refetch failed, or after a timeout with an unknown outcome,
//! mutations are refused.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut session = EditSession::open(backend, "17", EditorConfig::for_quotation()).await?;
//! let key = session.add("lines", fields)?;
//! session.toggle_removed("lines", RecordId::from(4u64))?;
//! println!("total: {}", session.total("lines")?);
//! session.submit().await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reconcile_core::{
    Amount, ChildDiff, EffectiveRow, FieldSet, LocalKey, NestedCollection, RecordId, RowRef,
    Snapshot, Summary,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::{CollectionProfile, EditorConfig};
use crate::error::{Result, SessionError};
use crate::payload::build_payload;
use crate::traits::{AcceptAll, DraftView, ParentRecord, RecordBackend, SubmitReceipt, Validator};

/// Where the session is in the submit lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepting edits
    Editing,
    /// A payload has been handed out and not yet settled
    Submitting,
    /// Changes were (or may have been) committed but fresh server state is missing
    Stale,
}

/// An editor session over one parent record.
pub struct EditSession {
    session_id: Uuid,
    parent_id: String,
    config: EditorConfig,
    backend: Arc<dyn RecordBackend>,
    validator: Box<dyn Validator>,
    state: SessionState,
    parent_base: Map<String, Value>,
    parent_patch: Map<String, Value>,
    collections: Vec<(CollectionProfile, NestedCollection)>,
    opened_at: DateTime<Utc>,
    last_submitted_at: Option<DateTime<Utc>>,
}

impl EditSession {
    /// Fetch a parent record and start editing it.
    pub async fn open(
        backend: Arc<dyn RecordBackend>,
        parent_id: impl Into<String>,
        config: EditorConfig,
    ) -> Result<Self> {
        config.validate()?;
        let parent_id = parent_id.into();
        let record = backend.fetch_parent(&parent_id).await?;

        let mut session = Self {
            session_id: Uuid::new_v4(),
            parent_id,
            collections: config
                .collections
                .iter()
                .map(|profile| (profile.clone(), NestedCollection::default()))
                .collect(),
            config,
            backend,
            validator: Box::new(AcceptAll),
            state: SessionState::Editing,
            parent_base: Map::new(),
            parent_patch: Map::new(),
            opened_at: Utc::now(),
            last_submitted_at: None,
        };
        session.install(record)?;

        tracing::info!(
            session_id = %session.session_id,
            collections = session.collections.len(),
            "Opened edit session for record {}",
            session.parent_id
        );
        Ok(session)
    }

    /// Replace the default accept-all validator.
    pub fn with_validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn parent_id(&self) -> &str {
        &self.parent_id
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn last_submitted_at(&self) -> Option<DateTime<Utc>> {
        self.last_submitted_at
    }

    // =========================================================================
    // Parent fields
    // =========================================================================

    /// Parent fields with pending edits applied.
    pub fn parent_fields(&self) -> Map<String, Value> {
        let mut fields = self.parent_base.clone();
        for (key, value) in &self.parent_patch {
            fields.insert(key.clone(), value.clone());
        }
        fields
    }

    /// Set a scalar field of the parent. Setting it back to the loaded value
    /// clears the pending edit.
    pub fn set_parent_field(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        self.ensure_editable()?;
        let key = key.into();
        if self.parent_base.get(&key) == Some(&value) {
            self.parent_patch.remove(&key);
        } else {
            self.parent_patch.insert(key, value);
        }
        Ok(())
    }

    // =========================================================================
    // Collection operations
    // =========================================================================

    /// Read access to one collection.
    pub fn collection(&self, name: &str) -> Result<&NestedCollection> {
        self.collections
            .iter()
            .find(|(profile, _)| profile.name == name)
            .map(|(_, collection)| collection)
            .ok_or_else(|| SessionError::UnknownCollection(name.to_string()))
    }

    pub fn add(&mut self, name: &str, fields: FieldSet) -> Result<LocalKey> {
        Ok(self.editable(name)?.add(fields)?)
    }

    pub fn remove_added(&mut self, name: &str, key: LocalKey) -> Result<bool> {
        Ok(self.editable(name)?.remove_added(key))
    }

    /// Patch a confirmed or added row.
    pub fn edit(&mut self, name: &str, row: impl Into<RowRef>, patch: FieldSet) -> Result<()> {
        Ok(self.editable(name)?.edit(row, patch)?)
    }

    pub fn mark_removed(&mut self, name: &str, row: impl Into<RowRef>) -> Result<bool> {
        Ok(self.editable(name)?.mark_removed(row)?)
    }

    pub fn unmark_removed(&mut self, name: &str, row: impl Into<RowRef>) -> Result<bool> {
        Ok(self.editable(name)?.unmark_removed(row)?)
    }

    /// Flip a row's tombstone; returns the new state.
    pub fn toggle_removed(&mut self, name: &str, row: impl Into<RowRef>) -> Result<bool> {
        Ok(self.editable(name)?.undo().toggle_removed(row)?)
    }

    /// Drop pending edits of a confirmed row.
    pub fn revert(&mut self, name: &str, id: &RecordId) -> Result<bool> {
        Ok(self.editable(name)?.undo().revert(id))
    }

    pub fn effective_view(&self, name: &str) -> Result<Vec<EffectiveRow>> {
        Ok(self.collection(name)?.effective_view())
    }

    /// Running total of a collection; zero if its profile has no measure.
    pub fn total(&self, name: &str) -> Result<Amount> {
        let (profile, collection) = self.entry(name)?;
        Ok(profile
            .measure
            .as_ref()
            .map(|measure| collection.total(measure))
            .unwrap_or_default())
    }

    /// Total plus counts and line values; `None` if the profile has no measure.
    pub fn summary(&self, name: &str) -> Result<Option<Summary>> {
        let (profile, collection) = self.entry(name)?;
        Ok(profile
            .measure
            .as_ref()
            .map(|measure| collection.summarize(measure)))
    }

    /// True if anything would be sent on submit.
    pub fn is_dirty(&self) -> bool {
        !self.parent_patch.is_empty()
            || self.collections.iter().any(|(_, collection)| collection.is_dirty())
    }

    /// Per-collection diffs, in configuration order.
    pub fn diffs(&self) -> Vec<(&CollectionProfile, ChildDiff)> {
        self.collections
            .iter()
            .map(|(profile, collection)| (profile, collection.to_payload()))
            .collect()
    }

    /// The request body a submit would send right now.
    pub fn payload(&self) -> Result<Value> {
        build_payload(&self.parent_fields(), &self.diffs(), self.config.omit_empty_diff)
    }

    /// What the validator sees.
    pub fn draft_view(&self) -> DraftView {
        DraftView {
            parent: self.parent_fields(),
            collections: self
                .collections
                .iter()
                .map(|(profile, collection)| (profile.name.clone(), collection.effective_view()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    /// Throw away every pending change.
    pub fn discard(&mut self) -> Result<()> {
        if self.state == SessionState::Submitting {
            return Err(SessionError::SubmitInFlight);
        }
        self.parent_patch.clear();
        for (_, collection) in &mut self.collections {
            collection.discard();
        }
        tracing::debug!(session_id = %self.session_id, "Discarded pending changes");
        Ok(())
    }

    // =========================================================================
    // Submit lifecycle
    // =========================================================================

    /// Validate and freeze the payload. Until the submit is settled with
    /// [`Self::complete_submit`] or [`Self::abort_submit`], edits are refused.
    pub fn begin_submit(&mut self) -> Result<Value> {
        self.ensure_editable()?;

        if let Err(errors) = self.validator.validate(&self.draft_view()) {
            tracing::debug!(
                session_id = %self.session_id,
                errors = errors.len(),
                "Validation blocked submit"
            );
            return Err(SessionError::Validation(errors));
        }

        let payload = self.payload()?;
        self.state = SessionState::Submitting;
        tracing::debug!(session_id = %self.session_id, "Submit started");
        Ok(payload)
    }

    /// The backend rejected or never received the payload. Pending changes stay.
    pub fn abort_submit(&mut self) -> Result<()> {
        if self.state != SessionState::Submitting {
            return Err(SessionError::NoSubmitInFlight);
        }
        self.state = SessionState::Editing;
        tracing::debug!(session_id = %self.session_id, "Submit aborted, pending changes kept");
        Ok(())
    }

    /// The backend accepted the payload. With fresh server state the session
    /// goes back to editing on new snapshots; without it the session is stale.
    pub fn complete_submit(&mut self, fresh: Result<ParentRecord>) -> Result<()> {
        if self.state != SessionState::Submitting {
            return Err(SessionError::NoSubmitInFlight);
        }
        self.last_submitted_at = Some(Utc::now());

        match fresh.and_then(|record| self.install(record)) {
            Ok(()) => {
                self.state = SessionState::Editing;
                tracing::debug!(session_id = %self.session_id, "Submit committed, snapshots refreshed");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Stale;
                tracing::warn!(
                    session_id = %self.session_id,
                    "Submit committed but refresh failed, session is stale: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Validate, send and settle in one call.
    ///
    /// On a transport failure the error is returned and every pending change
    /// is kept for a resend. A timeout leaves the outcome unknown, so the
    /// session goes [`SessionState::Stale`] and must be reloaded. If the
    /// commit succeeds but the refetch fails (or refetching is disabled), the
    /// receipt is still returned and the session is left stale as well.
    pub async fn submit(&mut self) -> Result<SubmitReceipt> {
        let payload = self.begin_submit()?;
        let backend = Arc::clone(&self.backend);

        let sent = backend.submit(&self.parent_id, &payload);
        let outcome = match self.config.submit_timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), sent).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Timeout(ms)),
            },
            None => sent.await,
        };

        let receipt = match outcome {
            Ok(receipt) => receipt,
            Err(SessionError::Timeout(ms)) => {
                // The payload may have been applied; resending could duplicate added rows
                self.state = SessionState::Stale;
                tracing::warn!(
                    session_id = %self.session_id,
                    "Submit timed out after {}ms, outcome unknown, session is stale",
                    ms
                );
                return Err(SessionError::Timeout(ms));
            }
            Err(e) => {
                tracing::error!(session_id = %self.session_id, "Submit failed: {}", e);
                self.abort_submit()?;
                return Err(e);
            }
        };
        tracing::info!(session_id = %self.session_id, "Record {} saved", self.parent_id);

        let fresh = if self.config.refetch_after_submit {
            backend.fetch_parent(&self.parent_id).await
        } else {
            Err(SessionError::Stale)
        };
        // A failed refresh is reported through the state, not as a failed submit
        let _ = self.complete_submit(fresh);
        Ok(receipt)
    }

    /// Fetch the record again and start over on fresh snapshots. Pending
    /// changes are dropped.
    pub async fn reload(&mut self) -> Result<()> {
        if self.state == SessionState::Submitting {
            return Err(SessionError::SubmitInFlight);
        }
        let record = self.backend.fetch_parent(&self.parent_id).await?;
        self.install(record)?;
        self.state = SessionState::Editing;
        tracing::debug!(session_id = %self.session_id, "Reloaded record {}", self.parent_id);
        Ok(())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Swap in server state. Nothing changes unless every collection parses.
    fn install(&mut self, record: ParentRecord) -> Result<()> {
        let mut snapshots = Vec::with_capacity(self.collections.len());
        for (profile, _) in &self.collections {
            snapshots.push(Snapshot::from_rows(record.rows(&profile.name), &profile.id_field)?);
        }
        for ((_, collection), snapshot) in self.collections.iter_mut().zip(snapshots) {
            collection.install_snapshot(snapshot);
        }
        self.parent_base = record.fields;
        self.parent_patch.clear();
        Ok(())
    }

    fn ensure_editable(&self) -> Result<()> {
        match self.state {
            SessionState::Editing => Ok(()),
            SessionState::Submitting => Err(SessionError::SubmitInFlight),
            SessionState::Stale => Err(SessionError::Stale),
        }
    }

    fn entry(&self, name: &str) -> Result<(&CollectionProfile, &NestedCollection)> {
        self.collections
            .iter()
            .find(|(profile, _)| profile.name == name)
            .map(|(profile, collection)| (profile, collection))
            .ok_or_else(|| SessionError::UnknownCollection(name.to_string()))
    }

    fn editable(&mut self, name: &str) -> Result<&mut NestedCollection> {
        self.ensure_editable()?;
        self.collections
            .iter_mut()
            .find(|(profile, _)| profile.name == name)
            .map(|(_, collection)| collection)
            .ok_or_else(|| {
                tracing::warn!("Unknown collection '{}'", name);
                SessionError::UnknownCollection(name.to_string())
            })
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("session_id", &self.session_id)
            .field("parent_id", &self.parent_id)
            .field("state", &self.state)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
