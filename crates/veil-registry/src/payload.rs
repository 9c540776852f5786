//! Payload abstraction, factories, and the payload registry contract.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use veil_targets::{Arch, PlatformSet};

/// Shared handle to a payload instance.
pub type PayloadRef = Arc<dyn Payload>;

/// Shared handle to a payload factory.
pub type FactoryRef = Arc<dyn PayloadFactory>;

/// A live payload instance.
pub trait Payload: fmt::Debug + Send + Sync {
    /// Reference name, e.g. `windows/x64/exec`.
    fn name(&self) -> &str;

    fn platform(&self) -> &PlatformSet;

    fn arch(&self) -> &[Arch];

    /// Whether the payload needs privileged execution.
    fn privileged(&self) -> bool {
        false
    }

    /// Compatibility keyword value (e.g. `ConnectionType`), space-separated.
    fn compat_value(&self, _key: &str) -> Option<&str> {
        None
    }

    /// Produce the raw, unencoded payload bytes.
    fn generate(&self) -> Result<Vec<u8>, String>;

    /// Platform/arch-parameterized payloads expose their reconfiguration
    /// capability here.
    fn as_generic(&self) -> Option<&dyn GenericPayload> {
        None
    }
}

/// Payloads whose behavior is parameterized by platform and architecture.
pub trait GenericPayload {
    /// Return a freshly normalized instance with the given overrides applied.
    /// `None` keeps the current value.
    fn reconfigure(&self, platform: Option<PlatformSet>, arch: Option<Vec<Arch>>) -> PayloadRef;
}

/// Builds payload instances for compatibility probing and generation.
pub trait PayloadFactory: fmt::Debug + Send + Sync {
    fn ref_name(&self) -> &str;

    fn create(&self) -> PayloadRef;
}

/// Name-to-factory lookup.
pub trait PayloadRegistry {
    fn lookup(&self, name: &str) -> Option<FactoryRef>;
}

/// A payload with fixed bytes, as declared in a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPayload {
    pub name: String,
    pub platform: PlatformSet,
    pub arch: Vec<Arch>,
    pub privileged: bool,
    pub bytes: Vec<u8>,
    pub compat: BTreeMap<String, String>,
    /// Whether the payload accepts platform/arch overrides.
    pub generic: bool,
}

impl StaticPayload {
    pub fn new(name: impl Into<String>, platform: PlatformSet, arch: Vec<Arch>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            platform,
            arch,
            privileged: false,
            bytes,
            compat: BTreeMap::new(),
            generic: false,
        }
    }
}

impl Payload for StaticPayload {
    fn name(&self) -> &str {
        &self.name
    }

    fn platform(&self) -> &PlatformSet {
        &self.platform
    }

    fn arch(&self) -> &[Arch] {
        &self.arch
    }

    fn privileged(&self) -> bool {
        self.privileged
    }

    fn compat_value(&self, key: &str) -> Option<&str> {
        self.compat
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn generate(&self) -> Result<Vec<u8>, String> {
        if self.bytes.is_empty() {
            return Err(format!("payload '{}' has no bytes", self.name));
        }
        Ok(self.bytes.clone())
    }

    fn as_generic(&self) -> Option<&dyn GenericPayload> {
        if self.generic {
            Some(self)
        } else {
            None
        }
    }
}

impl GenericPayload for StaticPayload {
    fn reconfigure(&self, platform: Option<PlatformSet>, arch: Option<Vec<Arch>>) -> PayloadRef {
        let mut next = self.clone();
        if let Some(platform) = platform {
            next.platform = platform;
        }
        if let Some(arch) = arch {
            next.arch = arch;
        }
        Arc::new(next)
    }
}

/// Factory cloning a [`StaticPayload`] prototype.
#[derive(Debug, Clone)]
pub struct StaticPayloadFactory {
    prototype: StaticPayload,
}

impl StaticPayloadFactory {
    pub fn new(prototype: StaticPayload) -> Self {
        Self { prototype }
    }
}

impl PayloadFactory for StaticPayloadFactory {
    fn ref_name(&self) -> &str {
        &self.prototype.name
    }

    fn create(&self) -> PayloadRef {
        Arc::new(self.prototype.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_targets::Platform;

    fn generic() -> StaticPayload {
        let mut p = StaticPayload::new(
            "generic/custom",
            PlatformSet::all(),
            vec![Arch::X86],
            vec![0xcc],
        );
        p.generic = true;
        p
    }

    #[test]
    fn fixed_payload_is_not_generic() {
        let mut p = generic();
        p.generic = false;
        assert!(p.as_generic().is_none());
    }

    #[test]
    fn reconfigure_returns_new_instance() {
        let p = generic();
        let windows: PlatformSet = [Platform::Windows].into_iter().collect();
        let next = p
            .as_generic()
            .unwrap()
            .reconfigure(Some(windows.clone()), Some(vec![Arch::X64]));
        assert_eq!(next.platform(), &windows);
        assert_eq!(next.arch(), &[Arch::X64]);
        // Original untouched.
        assert_eq!(p.platform(), &PlatformSet::all());
    }

    #[test]
    fn reconfigure_without_overrides_keeps_values() {
        let p = generic();
        let next = p.as_generic().unwrap().reconfigure(None, None);
        assert_eq!(next.arch(), p.arch());
        assert_eq!(next.platform(), p.platform());
    }

    #[test]
    fn compat_lookup_is_case_insensitive() {
        let mut p = generic();
        p.compat.insert("ConnectionType".into(), "reverse".into());
        assert_eq!(p.compat_value("connectiontype"), Some("reverse"));
        assert_eq!(p.compat_value("Convention"), None);
    }

    #[test]
    fn empty_payload_fails_to_generate() {
        let p = StaticPayload::new("empty", PlatformSet::all(), vec![], vec![]);
        assert!(p.generate().is_err());
    }

    #[test]
    fn factory_creates_fresh_instances() {
        let factory = StaticPayloadFactory::new(generic());
        let a = factory.create();
        let b = factory.create();
        assert_eq!(a.name(), "generic/custom");
        assert!(!Arc::ptr_eq(&a, &b));
    }
}
