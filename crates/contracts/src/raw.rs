//! RawFeedback - untrusted request fields
//!
//! Field-name -> raw string mapping as received from a form post or a batch item.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Recognized request field names
pub mod fields {
    pub const KEY: &str = "key";
    pub const TEXT: &str = "text";
    pub const URL: &str = "url";
    pub const ENTITY_URI: &str = "entity_uri";
    pub const SURFACE_FORM: &str = "surface_form";
    pub const OFFSET: &str = "offset";
    pub const FEEDBACK: &str = "feedback";
    pub const SYSTEMS: &str = "systems";
    pub const IS_MANUAL: &str = "is_manual_feedback";
    pub const LANGUAGE: &str = "language";
    pub const DISCOURSE_TYPE: &str = "discourse_type";
    pub const RIGHT_ENTITY: &str = "right_entity";
    pub const JSON_BATCH: &str = "json_batch";
    pub const XML_BATCH: &str = "xml_batch";

    /// Alternate spellings accepted on input, mapped to their canonical name
    pub(crate) const ALIASES: [(&str, &str); 2] = [("manual", IS_MANUAL), ("gender", DISCOURSE_TYPE)];

    /// Canonical name for a submitted field name
    pub fn canonical(name: &str) -> &str {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, canonical)| *canonical)
            .unwrap_or(name)
    }
}

/// Raw, unvalidated feedback fields
///
/// Aliases are folded into their canonical name on insert. When a field is
/// submitted more than once, the first non-blank value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFeedback {
    values: HashMap<String, String>,
}

impl RawFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs, e.g. a decoded form body
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut raw = Self::new();
        for (name, value) in pairs {
            raw.insert(name.as_ref(), value);
        }
        raw
    }

    /// Insert a field, keeping an earlier non-blank value for the same name
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let key = fields::canonical(name).to_string();
        match self.values.get(&key) {
            Some(existing) if !existing.trim().is_empty() => {}
            _ => {
                self.values.insert(key, value);
            }
        }
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Field value, or `None` when absent or blank
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(fields::canonical(name))
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Whether a non-blank value is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Drop a field (used to strip the auth key before batch handling)
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.values.remove(fields::canonical(name))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
