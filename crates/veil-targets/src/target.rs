//! Targets and the module-owned target list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;
use veil_core::OptValue;

use crate::arch::Arch;
use crate::platform::PlatformSet;

/// Name given to the synthesized target.
pub const AUTOMATIC: &str = "Automatic";

/// A named deployment environment a module can produce output for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Target {
    pub name: String,
    /// Empty means "use the module's platform".
    #[serde(default)]
    pub platform: PlatformSet,
    /// Empty means "use the module's architecture".
    #[serde(default)]
    pub arch: Vec<Arch>,
    /// Set only on the synthesized "Automatic" entry.
    #[serde(default)]
    pub auto_generated: bool,
    /// Target-specific settings (return addresses, offsets, ...).
    #[serde(default)]
    pub opts: BTreeMap<String, OptValue>,
}

impl Target {
    pub fn new(name: impl Into<String>, platform: PlatformSet, arch: Vec<Arch>) -> Self {
        Self {
            name: name.into(),
            platform,
            arch,
            auto_generated: false,
            opts: BTreeMap::new(),
        }
    }

    /// Whether the name follows the automatic-target naming pattern.
    pub fn is_automatic_name(&self) -> bool {
        self.name.contains(AUTOMATIC)
    }

    /// Target-specific setting by name.
    pub fn opt(&self, key: &str) -> Option<&OptValue> {
        self.opts.get(key)
    }
}

/// The ordered targets of a module plus the bookkeeping resolution needs.
///
/// Immutable after construction apart from the one-time synthesis step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    targets: Vec<Target>,
    default_index: Option<i64>,
    synthesized: Option<usize>,
}

impl TargetList {
    /// A target list with no default index.
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets,
            default_index: None,
            synthesized: None,
        }
    }

    /// Set the default index; negative values mean "no default".
    pub fn with_default(mut self, default_index: Option<i64>) -> Self {
        self.default_index = default_index;
        self
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Target> {
        self.targets.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Target> {
        self.targets.iter()
    }

    pub fn as_slice(&self) -> &[Target] {
        &self.targets
    }

    pub fn default_index(&self) -> Option<i64> {
        self.default_index
    }

    /// Index of the synthesized "Automatic" entry, if one was added.
    pub fn synthesized_index(&self) -> Option<usize> {
        self.synthesized
    }

    /// Index of the first target whose name matches exactly.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.name == name)
    }

    /// Whether any target is already named with the automatic pattern.
    pub fn has_auto_target(&self) -> bool {
        self.targets.iter().any(Target::is_automatic_name)
    }

    /// First entry that was declared by the module rather than synthesized.
    ///
    /// This is where an automatic selection lands when the auto-targeting
    /// capability cannot suggest anything.
    pub fn fallback_index(&self) -> Option<usize> {
        self.targets.iter().position(|t| !t.auto_generated)
    }

    /// Prepend a synthesized "Automatic" target.
    ///
    /// Only applies to lists with more than one entry, no existing
    /// automatic-named entry and no declared (non-negative) default index;
    /// the caller decides whether the module has the host option and
    /// auto-target capability. The new entry inherits the platform and
    /// architecture of the first target and becomes the default. Returns
    /// whether an entry was added.
    pub fn synthesize_automatic(&mut self) -> bool {
        if self.synthesized.is_some()
            || self.targets.len() <= 1
            || self.has_auto_target()
            || self.default_index.is_some_and(|d| d >= 0)
        {
            return false;
        }

        let template = &self.targets[0];

        let mut auto = Target::new(AUTOMATIC, template.platform.clone(), template.arch.clone());
        auto.auto_generated = true;
        auto.opts = template.opts.clone();

        debug!(
            inherits = %template.name,
            platform = %auto.platform,
            "synthesizing automatic target"
        );

        self.targets.insert(0, auto);
        self.synthesized = Some(0);
        self.default_index = Some(0);
        true
    }
}

impl From<Vec<Target>> for TargetList {
    fn from(targets: Vec<Target>) -> Self {
        TargetList::new(targets)
    }
}
