//! Session configuration
//!
//! One [`CollectionProfile`] per child collection of the parent record. The
//! profile name drives the payload keys (`add_<name>`, `update_<name>`,
//! `delete_<name>_ids`) and the key under which the backend returns rows.

use std::collections::HashSet;

use reconcile_core::{Measure, DEFAULT_ID_FIELD};
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::error::{Result, SessionError};

fn default_id_field() -> String {
    DEFAULT_ID_FIELD.to_string()
}

fn default_true() -> bool {
    true
}

/// How one child collection is addressed and totalled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct CollectionProfile {
    /// Collection name as the backend spells it, e.g. "lines"
    pub name: String,
    /// Field holding the server identifier in each row
    #[serde(default = "default_id_field")]
    pub id_field: String,
    /// Running total, if the editor shows one
    #[serde(default)]
    pub measure: Option<Measure>,
}

impl CollectionProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: default_id_field(),
            measure: None,
        }
    }

    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub fn with_measure(mut self, measure: Measure) -> Self {
        self.measure = Some(measure);
        self
    }

    pub fn add_key(&self) -> String {
        format!("add_{}", self.name)
    }

    pub fn update_key(&self) -> String {
        format!("update_{}", self.name)
    }

    pub fn delete_key(&self) -> String {
        format!("delete_{}_ids", self.name)
    }
}

/// Configuration for an edit session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct EditorConfig {
    pub collections: Vec<CollectionProfile>,
    /// Leave out the add/update/delete keys of collections with no changes
    #[serde(default)]
    pub omit_empty_diff: bool,
    /// Stop waiting for a submit after this many milliseconds (no limit if
    /// unset). The request may still have been applied, so a timed out
    /// session goes stale instead of offering a resend.
    #[serde(default)]
    pub submit_timeout_ms: Option<u64>,
    /// Fetch the record again after a successful submit
    #[serde(default = "default_true")]
    pub refetch_after_submit: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            collections: Vec::new(),
            omit_empty_diff: false,
            submit_timeout_ms: None,
            refetch_after_submit: true,
        }
    }
}

impl EditorConfig {
    pub fn new(collections: Vec<CollectionProfile>) -> Self {
        Self {
            collections,
            ..Default::default()
        }
    }

    /// Quotation editor: line items totalled as quantity x unit price
    pub fn for_quotation() -> Self {
        Self::new(vec![CollectionProfile::new("lines")
            .with_measure(Measure::product("quantity", "unit_price"))])
    }

    /// Sales order editor: items totalled as quantity x price
    pub fn for_sales_order() -> Self {
        Self::new(vec![
            CollectionProfile::new("items").with_measure(Measure::product("quantity", "price"))
        ])
    }

    /// Payment term editor: installment lines summed by value
    pub fn for_payment_term() -> Self {
        Self::new(vec![
            CollectionProfile::new("lines").with_measure(Measure::field("value"))
        ])
    }

    /// Account and client editors: social media links, no total
    pub fn for_social_links() -> Self {
        Self {
            omit_empty_diff: true,
            ..Self::new(vec![CollectionProfile::new("social_media")])
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.submit_timeout_ms = timeout_ms;
        self
    }

    /// Load config from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from YAML and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn profile(&self, name: &str) -> Option<&CollectionProfile> {
        self.collections.iter().find(|profile| profile.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collections.is_empty() {
            return Err(SessionError::Config("no collections configured".into()));
        }
        let mut seen = HashSet::new();
        for profile in &self.collections {
            if profile.name.trim().is_empty() {
                return Err(SessionError::Config("collection name is empty".into()));
            }
            if profile.id_field.trim().is_empty() {
                return Err(SessionError::Config(format!(
                    "collection '{}' has an empty id field",
                    profile.name
                )));
            }
            if !seen.insert(profile.name.as_str()) {
                return Err(SessionError::Config(format!(
                    "collection '{}' configured twice",
                    profile.name
                )));
            }
        }
        if self.submit_timeout_ms == Some(0) {
            return Err(SessionError::Config("submit timeout must be positive".into()));
        }
        Ok(())
    }
}
