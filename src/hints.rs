//! Warm hints: previously learned form knowledge supplied by a caching
//! collaborator.
//!
//! Hints are keyed by provider + program + stage upstream; by the time they
//! reach this crate they are a flat map from normalized field key to a
//! placeholder value (and optionally a better label). Hints only speed up
//! and sharpen discovery. Their absence must never cause a failure, only a
//! slower, less-confident run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cached knowledge about one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldHint {
    /// Placeholder value known to pass client-side validation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    /// Label learned from a previous run, preferred over DOM resolution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Selector that located the field last time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
}

/// Warm hints for one discovery run. `WarmHints::default()` is the cold
/// path and is always valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarmHints {
    /// Per-field hints keyed by normalized field key.
    #[serde(default)]
    pub fields: HashMap<String, FieldHint>,
}

impl WarmHints {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Placeholder value for a field key, if one was cached.
    pub fn placeholder(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|h| h.placeholder.as_deref())
    }

    /// Cached label override for a field key.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|h| h.label.as_deref())
    }
}
