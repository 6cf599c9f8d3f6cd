//! Client-model → upstream-model mapping.
//!
//! The map is configured through `MODEL_MAP_JSON`, either as a flat JSON
//! object (`{"claude-3-5-sonnet": "gpt-4.1"}`) or wrapped under a `models`
//! key. Keys are normalized (trimmed, lowercased) at parse time so lookups
//! are case- and whitespace-insensitive.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Error;

/// Normalize a model name for map lookups. Returns `None` when the
/// trimmed value is empty.
pub fn normalize_model_key(value: &str) -> Option<String> {
    let normalized = value.trim().to_lowercase();

    if normalized.is_empty() { None } else { Some(normalized) }
}

/// Parsed model mapping with normalized keys.
#[derive(Debug, Clone, Default)]
pub struct ModelMap {
    entries: BTreeMap<String, String>,
}

/// How a model lookup was satisfied. Surfaced in telemetry so operators
/// can see which requests fall through to the default model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Miss,
}

impl ModelMap {
    /// Parse the raw `MODEL_MAP_JSON` value.
    ///
    /// Accepts a flat object or `{"models": {…}}`. Mixing both shapes,
    /// empty keys, non-string or empty values, and keys that collide
    /// after normalization are all rejected.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let parsed: Value = serde_json::from_str(raw)?;

        let Value::Object(parsed) = parsed else {
            return Err(Error::ModelMapNotAnObject);
        };

        let mapping = match parsed.get("models") {
            Some(nested) => {
                let Value::Object(nested) = nested else {
                    return Err(Error::ModelMapNestedNotAnObject);
                };

                if parsed.len() > 1 {
                    return Err(Error::ModelMapMixedShape);
                }

                nested
            }
            None => &parsed,
        };

        let mut entries = BTreeMap::new();

        for (raw_key, raw_value) in mapping {
            let Some(key) = normalize_model_key(raw_key) else {
                return Err(Error::ModelMapEmptyKey);
            };

            let value = match raw_value {
                Value::String(value) if !value.trim().is_empty() => value.clone(),
                _ => return Err(Error::ModelMapInvalidValue(raw_key.clone())),
            };

            if entries.insert(key.clone(), value).is_some() {
                return Err(Error::ModelMapDuplicateKey(key));
            }
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an upstream model for a client-supplied name.
    ///
    /// Exact match on the normalized name wins. Otherwise, when exactly
    /// one configured key is a prefix of the normalized name, that entry
    /// is used; an ambiguous prefix falls through to the default.
    pub fn lookup(&self, requested: &str) -> (Option<&str>, MatchKind) {
        let Some(normalized) = normalize_model_key(requested) else {
            return (None, MatchKind::Miss);
        };

        if let Some(target) = self.entries.get(&normalized) {
            return (Some(target.as_str()), MatchKind::Exact);
        }

        let mut prefix_matches = self
            .entries
            .iter()
            .filter(|(key, _)| normalized.starts_with(key.as_str()));

        match (prefix_matches.next(), prefix_matches.next()) {
            (Some((_, target)), None) => (Some(target.as_str()), MatchKind::Prefix),
            _ => (None, MatchKind::Miss),
        }
    }
}
