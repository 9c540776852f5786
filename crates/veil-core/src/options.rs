//! Option registration.
//!
//! Modules register the options they understand, with a kind, a required
//! flag, and an optional default. Defaults are imported into the
//! [`DataStore`](crate::DataStore) so reads never have to special-case them.

use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::datastore::{ConfigurationView, DataStore, OptValue};
use crate::error::{CoreError, Result};

const ALPHA: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Random alphabetic text whose length is drawn from `len`.
pub fn rand_text_alpha(len: RangeInclusive<usize>) -> String {
    let mut rng = rand::thread_rng();
    let n = rng.gen_range(len);
    (0..n)
        .map(|_| ALPHA[rng.gen_range(0..ALPHA.len())] as char)
        .collect()
}

/// Value kind an option accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptKind {
    String,
    Int,
    Bool,
    Path,
    /// A network address; registering one marks the module as host-targeting.
    Address,
}

impl OptKind {
    fn accepts(self, value: &OptValue) -> bool {
        match self {
            OptKind::String | OptKind::Path | OptKind::Address => true,
            OptKind::Int => value.as_int().is_some(),
            OptKind::Bool => value.as_bool().is_some(),
        }
    }
}

/// A registered option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OptionSpec {
    /// Option name (matched case-insensitively).
    pub name: String,
    /// Accepted value kind.
    pub kind: OptKind,
    /// Whether the option must resolve to a value.
    #[serde(default)]
    pub required: bool,
    /// Help text.
    #[serde(default)]
    pub description: String,
    /// Default value.
    #[serde(default)]
    pub default: Option<OptValue>,
}

impl OptionSpec {
    /// An optional option with no default.
    pub fn new(name: impl Into<String>, kind: OptKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: String::new(),
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, default: impl Into<OptValue>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// The `FILENAME` option carried by every evasion module.
    ///
    /// Defaults to a random 3-10 letter name with an `.exe` extension.
    pub fn filename() -> Self {
        Self::new("FILENAME", OptKind::String)
            .required()
            .with_description("Filename for the evasive file (default: random)")
            .with_default(format!("{}.exe", rand_text_alpha(3..=10)))
    }
}

/// The set of options a module has registered, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    specs: Vec<OptionSpec>,
}

impl OptionSet {
    /// Create an empty option set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an option, replacing an earlier one with the same name.
    pub fn register(&mut self, spec: OptionSpec) {
        match self
            .specs
            .iter_mut()
            .find(|s| s.name.eq_ignore_ascii_case(&spec.name))
        {
            Some(existing) => *existing = spec,
            None => self.specs.push(spec),
        }
    }

    /// Look up an option by name.
    pub fn get(&self, name: &str) -> Option<&OptionSpec> {
        self.specs.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Whether any registered option names a remote host.
    pub fn has_remote_host(&self) -> bool {
        self.specs.iter().any(|s| {
            s.kind == OptKind::Address
                || s.name.eq_ignore_ascii_case("RHOST")
                || s.name.eq_ignore_ascii_case("RHOSTS")
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &OptionSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Check every registered option against a datastore: required options
    /// must resolve, and present values must match the option's kind.
    pub fn validate(&self, datastore: &DataStore) -> Result<()> {
        let mut missing = Vec::new();
        for spec in &self.specs {
            match datastore.get(&spec.name) {
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(CoreError::InvalidOption {
                        name: spec.name.clone(),
                        detail: format!("'{value}' is not a valid {:?} value", spec.kind),
                    });
                }
                Some(_) => {}
                None if spec.required => missing.push(spec.name.clone()),
                None => {}
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::MissingRequired { names: missing })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_text_alpha_respects_bounds() {
        for _ in 0..50 {
            let s = rand_text_alpha(3..=10);
            assert!((3..=10).contains(&s.len()));
            assert!(s.chars().all(|c| c.is_ascii_alphabetic()));
        }
    }

    #[test]
    fn filename_default_is_random_exe() {
        let spec = OptionSpec::filename();
        assert!(spec.required);
        let default = spec.default.unwrap();
        let name = default.as_str().unwrap();
        let stem = name.strip_suffix(".exe").unwrap();
        assert!(stem.chars().all(|c| c.is_ascii_alphabetic()));
        assert!((3..=10).contains(&stem.len()));
    }

    #[test]
    fn register_replaces_same_name() {
        let mut set = OptionSet::new();
        set.register(OptionSpec::new("TARGET", OptKind::Int));
        set.register(OptionSpec::new("target", OptKind::String).required());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("TARGET").unwrap().kind, OptKind::String);
    }

    #[test]
    fn remote_host_detection() {
        let mut set = OptionSet::new();
        assert!(!set.has_remote_host());
        set.register(OptionSpec::new("RHOST", OptKind::String));
        assert!(set.has_remote_host());

        let mut by_kind = OptionSet::new();
        by_kind.register(OptionSpec::new("TARGET_ADDR", OptKind::Address));
        assert!(by_kind.has_remote_host());
    }

    #[test]
    fn validate_reports_missing_and_bad_values() {
        let mut set = OptionSet::new();
        set.register(OptionSpec::new("LPORT", OptKind::Int).required());
        set.register(OptionSpec::filename());

        let mut ds = DataStore::new();
        ds.import_defaults(&set);
        match set.validate(&ds) {
            Err(CoreError::MissingRequired { names }) => assert_eq!(names, vec!["LPORT"]),
            other => panic!("expected missing LPORT, got {other:?}"),
        }

        ds.set("LPORT", "not-a-port");
        assert!(matches!(
            set.validate(&ds),
            Err(CoreError::InvalidOption { .. })
        ));

        ds.set("LPORT", 4444i64);
        assert!(set.validate(&ds).is_ok());
    }
}
