//! Active target resolution.
//!
//! The datastore key `TARGET` selects a target either by position or by
//! exact name. Modules that can infer a target at run time implement
//! [`AutoTargetable`]; when the selection lands on the synthesized
//! "Automatic" entry, the resolver asks that capability for a suggestion.

use tracing::debug;
use veil_core::{ConfigurationView, OptValue};

use crate::target::{Target, TargetList};

/// Datastore key selecting the active target.
pub const TARGET_KEY: &str = "TARGET";

/// Optional capability of modules that can pick a target at run time.
pub trait AutoTargetable {
    /// Suggest the index of the target to use; `None` if no suggestion.
    fn suggested_auto_target_index(&self, targets: &TargetList) -> Option<usize>;
}

/// The raw `TARGET` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    Index(i64),
    Name(String),
}

impl TargetSelector {
    /// Read the selector from configuration: integers (or integer-looking
    /// strings) are positions, anything else is a name.
    pub fn from_config(config: &dyn ConfigurationView) -> Option<Self> {
        let selector = match config.get(TARGET_KEY)? {
            OptValue::Int(n) => TargetSelector::Index(*n),
            OptValue::Str(s) => match s.trim().parse::<i64>() {
                Ok(n) => TargetSelector::Index(n),
                Err(_) => TargetSelector::Name(s.clone()),
            },
            OptValue::Bool(b) => TargetSelector::Name(b.to_string()),
        };
        Some(selector)
    }
}

/// Resolves the active target of a module.
pub struct TargetResolver<'a> {
    targets: &'a TargetList,
    auto: Option<&'a dyn AutoTargetable>,
}

impl<'a> TargetResolver<'a> {
    pub fn new(targets: &'a TargetList) -> Self {
        Self {
            targets,
            auto: None,
        }
    }

    /// Attach the auto-targeting capability.
    pub fn with_auto_target(mut self, auto: Option<&'a dyn AutoTargetable>) -> Self {
        self.auto = auto;
        self
    }

    /// Index selected by configuration and the default index, before any
    /// auto-targeting. Unmatched names and negative positions yield `None`;
    /// out-of-range positions are returned as-is.
    pub fn target_index(&self, config: &dyn ConfigurationView) -> Option<usize> {
        let selector = TargetSelector::from_config(config);

        // With a single target there is nothing to choose between.
        if selector.is_some() && self.targets.len() == 1 {
            return Some(0);
        }

        match selector {
            None => self
                .targets
                .default_index()
                .and_then(|d| usize::try_from(d).ok()),
            Some(TargetSelector::Index(n)) => usize::try_from(n).ok(),
            Some(TargetSelector::Name(name)) => self.targets.position(&name),
        }
    }

    /// Whether the configured selection is the synthesized automatic entry
    /// and the module can act on it.
    pub fn auto_target_requested(&self, config: &dyn ConfigurationView) -> bool {
        self.auto.is_some()
            && self
                .target_index(config)
                .and_then(|i| self.targets.get(i))
                .is_some_and(|t| t.auto_generated)
    }

    /// Final index after auto-targeting; `None` if nothing valid is selected.
    pub fn resolve_index(&self, config: &dyn ConfigurationView) -> Option<usize> {
        let mut index = self.target_index(config);

        if let Some(auto) = self.auto {
            if self.auto_target_requested(config) {
                let suggested = auto
                    .suggested_auto_target_index(self.targets)
                    .filter(|&i| self.targets.get(i).is_some_and(|t| !t.auto_generated));
                index = match suggested {
                    Some(i) => {
                        debug!(index = i, "auto-target suggestion accepted");
                        Some(i)
                    }
                    None => {
                        let fallback = self.targets.fallback_index();
                        debug!(?fallback, "no usable auto-target suggestion, falling back");
                        fallback
                    }
                };
            }
        }

        index.filter(|&i| i < self.targets.len())
    }

    /// The active target, if any.
    pub fn resolve(&self, config: &dyn ConfigurationView) -> Option<&'a Target> {
        let index = self.resolve_index(config);
        if index.is_none() {
            debug!("no target selected");
        }
        index.and_then(|i| self.targets.get(i))
    }
}

/// Resolve the active target of `targets` under `config`.
pub fn resolve<'a>(
    targets: &'a TargetList,
    config: &dyn ConfigurationView,
    auto: Option<&'a dyn AutoTargetable>,
) -> Option<&'a Target> {
    TargetResolver::new(targets)
        .with_auto_target(auto)
        .resolve(config)
}
