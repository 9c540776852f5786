//! Loosely-typed, string-keyed module configuration.
//!
//! Keys are case-insensitive and stored in canonical upper-case form. A
//! lookup that misses the user-set values falls back to the defaults of
//! registered options, so callers never distinguish "unset" from "defaulted".

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::options::OptionSet;

/// A configuration value as supplied by a user or a module default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl OptValue {
    /// Coerce free-form text (e.g. a `KEY=VALUE` command-line override):
    /// integer first, then boolean, otherwise the raw string.
    pub fn parse_loose(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<i64>() {
            return OptValue::Int(n);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => OptValue::Bool(true),
            "false" => OptValue::Bool(false),
            _ => OptValue::Str(raw.to_string()),
        }
    }

    /// Borrow the string payload, if this is a string value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view: integers as-is, strings only if they parse cleanly.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptValue::Int(n) => Some(*n),
            OptValue::Str(s) => s.trim().parse().ok(),
            OptValue::Bool(_) => None,
        }
    }

    /// Boolean view accepting the usual textual spellings.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            OptValue::Bool(b) => Some(*b),
            OptValue::Int(n) => Some(*n != 0),
            OptValue::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Some(true),
                "false" | "no" | "n" | "0" | "" => Some(false),
                _ => None,
            },
        }
    }
}

impl fmt::Display for OptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptValue::Bool(b) => write!(f, "{b}"),
            OptValue::Int(n) => write!(f, "{n}"),
            OptValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptValue {
    fn from(s: &str) -> Self {
        OptValue::Str(s.to_string())
    }
}

impl From<String> for OptValue {
    fn from(s: String) -> Self {
        OptValue::Str(s)
    }
}

impl From<i64> for OptValue {
    fn from(n: i64) -> Self {
        OptValue::Int(n)
    }
}

impl From<bool> for OptValue {
    fn from(b: bool) -> Self {
        OptValue::Bool(b)
    }
}

/// Read-only typed access over a configuration map.
///
/// Every key is optional: absent keys yield `None` (or `false` for
/// [`flag`](ConfigurationView::flag)), never an error.
pub trait ConfigurationView {
    /// Raw value lookup.
    fn get(&self, key: &str) -> Option<&OptValue>;

    /// String rendering of any value kind.
    fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    /// Integer view of a value.
    fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(OptValue::as_int)
    }

    /// Boolean view of a value.
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(OptValue::as_bool)
    }

    /// Boolean flag, `false` when absent or unreadable.
    fn flag(&self, key: &str) -> bool {
        self.get_bool(key).unwrap_or(false)
    }
}

fn canonical(key: &str) -> String {
    key.trim().to_ascii_uppercase()
}

/// The module datastore: user-set values layered over option defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataStore {
    values: BTreeMap<String, OptValue>,
    defaults: BTreeMap<String, OptValue>,
}

impl DataStore {
    /// Create an empty datastore.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a user value, replacing any previous one.
    pub fn set(&mut self, key: &str, value: impl Into<OptValue>) {
        self.values.insert(canonical(key), value.into());
    }

    /// Remove a user value, exposing the default again (if any).
    pub fn unset(&mut self, key: &str) -> Option<OptValue> {
        self.values.remove(&canonical(key))
    }

    /// Whether a user value (not a default) is present.
    pub fn is_set(&self, key: &str) -> bool {
        self.values.contains_key(&canonical(key))
    }

    /// Record the defaults of every registered option that has one.
    pub fn import_defaults(&mut self, options: &OptionSet) {
        for spec in options.iter() {
            if let Some(default) = &spec.default {
                self.defaults.insert(canonical(&spec.name), default.clone());
            }
        }
    }

    /// Merge another store's user values over this one.
    pub fn merge(&mut self, other: &DataStore) {
        for (k, v) in &other.values {
            self.values.insert(k.clone(), v.clone());
        }
    }

    /// User-set values in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of user-set values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no user values are set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigurationView for DataStore {
    fn get(&self, key: &str) -> Option<&OptValue> {
        let key = canonical(key);
        self.values.get(&key).or_else(|| self.defaults.get(&key))
    }
}

impl FromIterator<(String, OptValue)> for DataStore {
    fn from_iter<I: IntoIterator<Item = (String, OptValue)>>(iter: I) -> Self {
        let mut store = DataStore::new();
        for (k, v) in iter {
            store.set(&k, v);
        }
        store
    }
}

/// Parse a datastore preset from a flat TOML table (`KEY = value`).
pub fn parse_datastore_toml(toml_str: &str) -> Result<DataStore> {
    let table: BTreeMap<String, OptValue> = toml::from_str(toml_str)?;
    Ok(table.into_iter().collect())
}

/// Load a datastore preset from a TOML file.
pub fn load_datastore_toml(path: &Path) -> Result<DataStore> {
    if !path.exists() {
        return Err(CoreError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_datastore_toml(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{OptKind, OptionSpec};

    #[test]
    fn keys_are_case_insensitive() {
        let mut ds = DataStore::new();
        ds.set("Target", 2i64);
        assert_eq!(ds.get_int("TARGET"), Some(2));
        assert_eq!(ds.get_int("target"), Some(2));
        assert!(ds.is_set("tArGeT"));
    }

    #[test]
    fn absent_keys_are_none_not_errors() {
        let ds = DataStore::new();
        assert!(ds.get("ENCODER").is_none());
        assert!(ds.get_int("TARGET").is_none());
        assert!(!ds.flag("EnableContextEncoding"));
    }

    #[test]
    fn defaults_fill_gaps_until_overridden() {
        let mut options = OptionSet::new();
        options.register(OptionSpec::new("NOP", OptKind::String).with_default("x86/single_byte"));
        let mut ds = DataStore::new();
        ds.import_defaults(&options);
        assert_eq!(ds.get_string("NOP").as_deref(), Some("x86/single_byte"));
        assert!(!ds.is_set("NOP"));

        ds.set("NOP", "x86/opty2");
        assert_eq!(ds.get_string("NOP").as_deref(), Some("x86/opty2"));

        ds.unset("NOP");
        assert_eq!(ds.get_string("NOP").as_deref(), Some("x86/single_byte"));
    }

    #[test]
    fn loose_parsing() {
        assert_eq!(OptValue::parse_loose("3"), OptValue::Int(3));
        assert_eq!(OptValue::parse_loose("TRUE"), OptValue::Bool(true));
        assert_eq!(
            OptValue::parse_loose("Windows XP"),
            OptValue::Str("Windows XP".into())
        );
    }

    #[test]
    fn string_values_expose_integers_and_bools() {
        assert_eq!(OptValue::from("7").as_int(), Some(7));
        assert_eq!(OptValue::from("seven").as_int(), None);
        assert_eq!(OptValue::from("yes").as_bool(), Some(true));
        assert_eq!(OptValue::from(true).as_int(), None);
    }

    #[test]
    fn parse_preset_table() {
        let ds = parse_datastore_toml(
            r#"
TARGET = 1
ENCODER = "x86/shikata_ga_nai"
EnableContextEncoding = true
"#,
        )
        .unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.get_int("TARGET"), Some(1));
        assert!(ds.flag("ENABLECONTEXTENCODING"));
    }

    #[test]
    fn load_missing_preset() {
        let err = load_datastore_toml(Path::new("/nonexistent/preset.toml")).unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn load_preset_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preset.toml");
        std::fs::write(&path, "NOP = \"x86/single_byte\"\n").unwrap();
        let ds = load_datastore_toml(&path).unwrap();
        assert_eq!(ds.get_string("nop").as_deref(), Some("x86/single_byte"));
    }

    #[test]
    fn merge_overrides_values() {
        let mut base: DataStore = [("TARGET".to_string(), OptValue::Int(0))]
            .into_iter()
            .collect();
        let mut over = DataStore::new();
        over.set("target", 2i64);
        over.set("FILENAME", "x.exe");
        base.merge(&over);
        assert_eq!(base.get_int("TARGET"), Some(2));
        assert_eq!(base.len(), 2);
    }
}
