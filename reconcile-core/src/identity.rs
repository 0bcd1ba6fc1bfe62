//! Row identity - two disjoint address spaces
//!
//! Persisted children are addressed by a server-assigned [`RecordId`];
//! children created during the session are addressed by a [`LocalKey`].
//! [`RowRef`] is the only handle callers use, so the address space of a
//! reference is decided once, at the boundary, and never guessed later.
//!
//! Server identifiers arrive as JSON numbers or strings depending on the
//! endpoint (`1`, `"1"`, `"001"`). They are normalised to a single canonical
//! form so that lookups cannot miss because of a representation mismatch.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{LedgerError, Result};

/// Prefix used when rendering draft keys. Server identifiers may not use it.
pub const DRAFT_PREFIX: &str = "draft-";

// =============================================================================
// RecordId - canonical server identifier
// =============================================================================

/// Server-assigned identifier in canonical form.
///
/// Integer identifiers are stored without sign padding or leading zeros;
/// any other identifier (uuid, slug) is stored trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Normalise a JSON identifier.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Self(i.to_string()));
                }
                if let Some(u) = n.as_u64() {
                    return Ok(Self(u.to_string()));
                }
                match n.as_f64() {
                    // 2^53: beyond this a float no longer names one integer
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 => {
                        Ok(Self((f as i64).to_string()))
                    }
                    _ => Err(LedgerError::InvalidIdentifier(n.to_string())),
                }
            }
            Value::String(s) => Self::parse(s),
            other => Err(LedgerError::InvalidIdentifier(other.to_string())),
        }
    }

    /// Normalise a textual identifier.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with(DRAFT_PREFIX) {
            return Err(LedgerError::InvalidIdentifier(raw.to_string()));
        }

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            let stripped = digits.trim_start_matches('0');
            let canonical = match (stripped.is_empty(), negative) {
                (true, _) => "0".to_string(),
                (false, true) => format!("-{}", stripped),
                (false, false) => stripped.to_string(),
            };
            return Ok(Self(canonical));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Canonical text form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// JSON form sent back to the server: a number for integer ids.
    pub fn to_json(&self) -> Value {
        if let Ok(i) = self.0.parse::<i64>() {
            return Value::from(i);
        }
        if let Ok(u) = self.0.parse::<u64>() {
            return Value::from(u);
        }
        Value::String(self.0.clone())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RecordId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(D::Error::custom)
    }
}

// =============================================================================
// LocalKey - session-local key for unsaved children
// =============================================================================

/// Ephemeral key of a child that has not been persisted yet.
///
/// Keys are handed out monotonically by the ledger and never reused within
/// a session, so they stay valid display keys after removals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalKey(u64);

impl LocalKey {
    pub(crate) fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Sequence number within the session
    pub fn seq(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DRAFT_PREFIX, self.0)
    }
}

impl FromStr for LocalKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        s.trim()
            .strip_prefix(DRAFT_PREFIX)
            .and_then(|seq| seq.parse::<u64>().ok())
            .map(Self)
            .ok_or_else(|| LedgerError::InvalidIdentifier(s.to_string()))
    }
}

impl Serialize for LocalKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LocalKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

// =============================================================================
// RowRef - address of any row in the effective view
// =============================================================================

/// Reference to a row, tagged with its address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowRef {
    /// Persisted child, addressed by server id
    Confirmed(RecordId),
    /// Unsaved child, addressed by draft key
    Draft(LocalKey),
}

impl RowRef {
    /// Resolve a JSON row reference. Draft keys are strings carrying the
    /// draft prefix; everything else must be a valid server identifier.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::String(s) if s.trim().starts_with(DRAFT_PREFIX) => Ok(RowRef::Draft(s.parse()?)),
            other => Ok(RowRef::Confirmed(RecordId::from_json(other)?)),
        }
    }

    /// Resolve a textual row reference (as handed over by a JS caller).
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().starts_with(DRAFT_PREFIX) {
            Ok(RowRef::Draft(raw.parse()?))
        } else {
            Ok(RowRef::Confirmed(RecordId::parse(raw)?))
        }
    }

    pub fn is_draft(&self) -> bool {
        matches!(self, RowRef::Draft(_))
    }
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Confirmed(id) => id.fmt(f),
            RowRef::Draft(key) => key.fmt(f),
        }
    }
}

impl From<RecordId> for RowRef {
    fn from(id: RecordId) -> Self {
        RowRef::Confirmed(id)
    }
}

impl From<LocalKey> for RowRef {
    fn from(key: LocalKey) -> Self {
        RowRef::Draft(key)
    }
}

impl Serialize for RowRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RowRef::Confirmed(id) => id.serialize(serializer),
            RowRef::Draft(key) => key.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for RowRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(D::Error::custom)
    }
}
