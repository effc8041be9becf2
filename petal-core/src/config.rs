//! Override configuration helpers
//!
//! Runs carry a flat `key -> value` map of string overrides. These helpers
//! build that map from `key=value` arguments and TOML files, and validate it
//! before submission.

use std::collections::HashMap;
use thiserror::Error;

/// Maximum length of an override key
pub const MAX_OVERRIDE_KEY_LENGTH: usize = 256;

/// Maximum number of overrides accepted for one run
pub const MAX_OVERRIDE_ENTRIES: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid KEY=value: no `=` found in `{0}`")]
    MissingSeparator(String),

    #[error("override key must not be empty")]
    EmptyKey,

    #[error("override key `{0}` is longer than {MAX_OVERRIDE_KEY_LENGTH} characters")]
    KeyTooLong(String),

    #[error("too many overrides ({0}, max: {MAX_OVERRIDE_ENTRIES})")]
    TooManyEntries(usize),

    #[error("override key `{0}` given more than once")]
    DuplicateKey(String),
}

/// Parse a single `key=value` override
///
/// The string is split at the first `=`, so values may themselves contain `=`.
pub fn parse_override(s: &str) -> Result<(String, String), ConfigError> {
    let pos = s
        .find('=')
        .ok_or_else(|| ConfigError::MissingSeparator(s.to_string()))?;

    let key = s[..pos].trim();
    if key.is_empty() {
        return Err(ConfigError::EmptyKey);
    }

    Ok((key.to_string(), s[pos + 1..].to_string()))
}

/// Flatten a TOML table into dotted keys with string values
///
/// Nested tables become `outer.inner` keys. Strings are taken verbatim; other
/// values use their TOML representation.
pub fn flatten_toml(table: &toml::Table) -> HashMap<String, String> {
    let mut out = HashMap::new();
    flatten_into(&mut out, None, table);
    out
}

fn flatten_into(out: &mut HashMap<String, String>, prefix: Option<&str>, table: &toml::Table) {
    for (key, value) in table {
        let full_key = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };

        match value {
            toml::Value::Table(inner) => flatten_into(out, Some(&full_key), inner),
            toml::Value::String(s) => {
                out.insert(full_key, s.clone());
            }
            other => {
                out.insert(full_key, other.to_string());
            }
        }
    }
}

/// Merge `key=value` pairs into `base`, rejecting keys given more than once
pub fn merge_overrides(
    base: &mut HashMap<String, String>,
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Result<(), ConfigError> {
    for (key, value) in pairs {
        if base.contains_key(&key) {
            return Err(ConfigError::DuplicateKey(key));
        }
        base.insert(key, value);
    }
    Ok(())
}

/// Check an override map against the key and size limits
pub fn validate_overrides(overrides: &HashMap<String, String>) -> Result<(), ConfigError> {
    if overrides.len() > MAX_OVERRIDE_ENTRIES {
        return Err(ConfigError::TooManyEntries(overrides.len()));
    }

    for key in overrides.keys() {
        if key.trim().is_empty() {
            return Err(ConfigError::EmptyKey);
        }
        if key.len() > MAX_OVERRIDE_KEY_LENGTH {
            return Err(ConfigError::KeyTooLong(key.clone()));
        }
    }

    Ok(())
}
