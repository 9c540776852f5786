//! General (convention/connection) compatibility between a module and a payload.

use std::collections::BTreeMap;

use crate::payload::Payload;

/// Decides whether a payload instance fits a module's conventions.
pub trait CompatibilityPredicate {
    fn is_compatible(&self, payload: &dyn Payload) -> bool;
}

/// Accepts every payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysCompatible;

impl CompatibilityPredicate for AlwaysCompatible {
    fn is_compatible(&self, _payload: &dyn Payload) -> bool {
        true
    }
}

/// Keyword-based compatibility.
///
/// The module lists, per keyword, space-separated tokens. A token prefixed
/// with `-` is forbidden. For each listed keyword a payload declaring a value
/// must carry no forbidden token and, when plain tokens are listed, at least
/// one of them. Payloads that do not declare the keyword are not restricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordCompat {
    keywords: BTreeMap<String, String>,
}

impl KeywordCompat {
    pub fn new(keywords: BTreeMap<String, String>) -> Self {
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    /// Check a single keyword against the payload's declared value.
    pub fn allows(&self, key: &str, payload_value: Option<&str>) -> bool {
        let Some(spec) = self
            .keywords
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
        else {
            return true;
        };
        let Some(value) = payload_value else {
            return true;
        };

        let offered: Vec<String> = value
            .split_whitespace()
            .map(|t| t.to_ascii_lowercase())
            .collect();
        let mut wanted = Vec::new();
        for token in spec.split_whitespace().map(|t| t.to_ascii_lowercase()) {
            match token.strip_prefix('-') {
                Some(forbidden) => {
                    if offered.iter().any(|o| o == forbidden) {
                        return false;
                    }
                }
                None => wanted.push(token),
            }
        }
        wanted.is_empty() || offered.iter().any(|o| wanted.contains(o))
    }
}

impl CompatibilityPredicate for KeywordCompat {
    fn is_compatible(&self, payload: &dyn Payload) -> bool {
        self.keywords
            .keys()
            .all(|key| self.allows(key, payload.compat_value(key)))
    }
}
