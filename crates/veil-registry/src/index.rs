//! Metadata index query contract.

use veil_core::ModuleType;
use veil_targets::{Arch, Platform, PlatformSet};

use crate::descriptor::PayloadDescriptor;
use crate::error::Result;

/// An include/exclude pair. An empty include list places no restriction;
/// a candidate carrying any excluded value is rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter<T> {
    pub include: Vec<T>,
    pub exclude: Vec<T>,
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl<T: PartialEq> Filter<T> {
    pub fn new(include: Vec<T>, exclude: Vec<T>) -> Self {
        Self { include, exclude }
    }

    /// Whether any of `values` is excluded.
    pub fn excludes_any<'a>(&self, mut values: impl Iterator<Item = &'a T>) -> bool
    where
        T: 'a,
    {
        values.any(|v| self.exclude.contains(v))
    }
}

/// A query against the metadata index: `{type, platform, arch}` filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexQuery {
    pub module_type: Filter<ModuleType>,
    pub platform: Filter<Platform>,
    pub arch: Filter<Arch>,
}

impl IndexQuery {
    /// Query restricted to payload modules.
    pub fn payloads() -> Self {
        Self {
            module_type: Filter::new(vec![ModuleType::Payload], Vec::new()),
            ..Self::default()
        }
    }

    pub fn with_platform(mut self, include: Vec<Platform>, exclude: Vec<Platform>) -> Self {
        self.platform = Filter::new(include, exclude);
        self
    }

    pub fn with_arch(mut self, include: Vec<Arch>, exclude: Vec<Arch>) -> Self {
        self.arch = Filter::new(include, exclude);
        self
    }

    /// Reference semantics for index implementations.
    ///
    /// Platform inclusion treats a descriptor supporting `All` as matching;
    /// architecture inclusion needs one shared entry.
    pub fn matches(&self, d: &PayloadDescriptor) -> bool {
        let type_ok = (self.module_type.include.is_empty()
            || self.module_type.include.contains(&d.module_type))
            && !self.module_type.exclude.contains(&d.module_type);
        if !type_ok {
            return false;
        }

        let include: PlatformSet = self.platform.include.iter().cloned().collect();
        let platform_ok = (self.platform.include.is_empty()
            || d.supported_platforms.supports_any_of(&include))
            && !self.platform.excludes_any(d.supported_platforms.iter());
        if !platform_ok {
            return false;
        }

        (self.arch.include.is_empty()
            || d.supported_archs.iter().any(|a| self.arch.include.contains(a)))
            && !self.arch.excludes_any(d.supported_archs.iter())
    }
}

/// External catalog answering descriptor queries.
///
/// Implementations must preserve their natural ordering in results and be
/// safe for concurrent reads; this crate performs no locking.
pub trait MetadataIndex {
    fn query(&self, query: &IndexQuery) -> Result<Vec<PayloadDescriptor>>;
}
