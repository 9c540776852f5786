//! Payload compatibility matching against a resolved target.

use std::fmt;

use tracing::{debug, warn};
use veil_targets::{Arch, Platform, PlatformSet};

use crate::compat::CompatibilityPredicate;
use crate::descriptor::PayloadDescriptor;
use crate::error::Result;
use crate::index::{IndexQuery, MetadataIndex};
use crate::payload::{FactoryRef, PayloadRegistry};

/// Architectures to match when none were specified: the 32-bit x86 baseline.
pub fn normalize_arch(arch: &[Arch]) -> Vec<Arch> {
    if arch.is_empty() {
        vec![Arch::BASELINE]
    } else {
        arch.to_vec()
    }
}

/// Filter descriptors by platform, architecture, and privilege.
///
/// A candidate passes iff its platforms intersect `target_platform ∪ {All}`
/// and none is excluded, its architectures intersect `target_arch` (x86
/// when empty) and none is excluded, and it is unprivileged unless
/// `evasion_is_privileged`. Input order is preserved.
pub fn filter(
    candidates: &[PayloadDescriptor],
    target_platform: &PlatformSet,
    target_arch: &[Arch],
    excluded_platforms: &[Platform],
    excluded_archs: &[Arch],
    evasion_is_privileged: bool,
) -> Vec<PayloadDescriptor> {
    let arch = normalize_arch(target_arch);
    candidates
        .iter()
        .filter(|d| {
            d.supported_platforms.supports_any_of(target_platform)
                && !d
                    .supported_platforms
                    .iter()
                    .any(|p| excluded_platforms.contains(p))
        })
        .filter(|d| {
            d.supported_archs.iter().any(|a| arch.contains(a))
                && !d.supported_archs.iter().any(|a| excluded_archs.contains(a))
        })
        .filter(|d| !d.privileged || evasion_is_privileged)
        .cloned()
        .collect()
}

/// Build an instance of `name` and check it against the module: it must
/// exist in the registry, satisfy `predicate`, and be unprivileged unless
/// `evasion_is_privileged`. Returns the factory on success.
pub fn probe_payload(
    registry: &dyn PayloadRegistry,
    predicate: &dyn CompatibilityPredicate,
    evasion_is_privileged: bool,
    name: &str,
) -> Option<FactoryRef> {
    let Some(factory) = registry.lookup(name) else {
        warn!(payload = name, "payload missing from registry");
        return None;
    };
    let instance = factory.create();

    if !predicate.is_compatible(instance.as_ref()) {
        debug!(payload = name, "rejected by compatibility keywords");
        return None;
    }
    if instance.privileged() && !evasion_is_privileged {
        debug!(payload = name, "rejected: requires privileged execution");
        return None;
    }
    Some(factory)
}

/// A payload that passed every compatibility check.
#[derive(Clone)]
pub struct CompatiblePayload {
    pub name: String,
    pub factory: FactoryRef,
}

impl fmt::Debug for CompatiblePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompatiblePayload")
            .field("name", &self.name)
            .finish()
    }
}

/// Combines the metadata index, the payload registry, and the module's
/// compatibility predicate.
pub struct CompatibilityMatcher<'a> {
    index: &'a dyn MetadataIndex,
    registry: &'a dyn PayloadRegistry,
    predicate: &'a dyn CompatibilityPredicate,
    privileged: bool,
}

impl<'a> CompatibilityMatcher<'a> {
    pub fn new(
        index: &'a dyn MetadataIndex,
        registry: &'a dyn PayloadRegistry,
        predicate: &'a dyn CompatibilityPredicate,
        privileged: bool,
    ) -> Self {
        Self {
            index,
            registry,
            predicate,
            privileged,
        }
    }

    /// Probe a payload by name: it must exist in the registry, satisfy the
    /// general compatibility predicate, and respect the privilege rule.
    pub fn is_payload_compatible(&self, name: &str) -> bool {
        self.probe(name).is_some()
    }

    /// [`is_payload_compatible`](Self::is_payload_compatible) for a
    /// descriptor; the descriptor's own privilege flag is honored too.
    pub fn is_compatible(&self, descriptor: &PayloadDescriptor) -> bool {
        (!descriptor.privileged || self.privileged)
            && self.is_payload_compatible(&descriptor.ref_name)
    }

    fn probe(&self, name: &str) -> Option<FactoryRef> {
        probe_payload(self.registry, self.predicate, self.privileged, name)
    }

    /// Payloads deliverable to the given platform/architecture, in index order.
    pub fn compatible_payloads(
        &self,
        platform: &PlatformSet,
        arch: &[Arch],
        excluded_platforms: &[Platform],
        excluded_archs: &[Arch],
    ) -> Result<Vec<CompatiblePayload>> {
        let arch = normalize_arch(arch);
        let query = IndexQuery::payloads()
            .with_platform(
                platform.with_all().iter().cloned().collect(),
                excluded_platforms.to_vec(),
            )
            .with_arch(arch.clone(), excluded_archs.to_vec());

        let results = self.index.query(&query)?;
        let candidates = filter(
            &results,
            platform,
            &arch,
            excluded_platforms,
            excluded_archs,
            self.privileged,
        );
        debug!(
            indexed = results.len(),
            candidates = candidates.len(),
            platform = %platform,
            "matching payloads"
        );

        Ok(candidates
            .into_iter()
            .filter_map(|d| {
                self.probe(&d.ref_name).map(|factory| CompatiblePayload {
                    name: d.ref_name,
                    factory,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::{AlwaysCompatible, KeywordCompat};
    use crate::payload::{StaticPayload, StaticPayloadFactory};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn set(platforms: &[Platform]) -> PlatformSet {
        platforms.iter().cloned().collect()
    }

    fn desc(name: &str, platforms: &[Platform], archs: &[Arch], privileged: bool) -> PayloadDescriptor {
        PayloadDescriptor::new(name, set(platforms), archs.to_vec()).privileged(privileged)
    }

    /// Index + registry over the same in-memory list.
    struct Fixture {
        descriptors: Vec<PayloadDescriptor>,
        payloads: HashMap<String, StaticPayload>,
    }

    impl Fixture {
        fn new(descriptors: Vec<PayloadDescriptor>) -> Self {
            let payloads = descriptors
                .iter()
                .map(|d| {
                    let mut p = StaticPayload::new(
                        d.ref_name.clone(),
                        d.supported_platforms.clone(),
                        d.supported_archs.clone(),
                        vec![0x90],
                    );
                    p.privileged = d.privileged;
                    (d.ref_name.clone(), p)
                })
                .collect();
            Self {
                descriptors,
                payloads,
            }
        }
    }

    impl MetadataIndex for Fixture {
        fn query(&self, query: &IndexQuery) -> Result<Vec<PayloadDescriptor>> {
            Ok(self
                .descriptors
                .iter()
                .filter(|d| query.matches(d))
                .cloned()
                .collect())
        }
    }

    impl PayloadRegistry for Fixture {
        fn lookup(&self, name: &str) -> Option<FactoryRef> {
            self.payloads
                .get(name)
                .map(|p| Arc::new(StaticPayloadFactory::new(p.clone())) as FactoryRef)
        }
    }

    fn names(d: &[PayloadDescriptor]) -> Vec<&str> {
        d.iter().map(|d| d.ref_name.as_str()).collect()
    }

    #[test]
    fn filter_by_platform_and_arch() {
        let c = vec![
            desc("A", &[Platform::Windows], &[Arch::X86], false),
            desc("B", &[Platform::Linux], &[Arch::X86], false),
            desc("C", &[Platform::Windows], &[Arch::X64], false),
            desc("D", &[Platform::All], &[Arch::X86], false),
        ];
        let out = filter(&c, &set(&[Platform::Windows]), &[Arch::X86], &[], &[], false);
        assert_eq!(names(&out), vec!["A", "D"]);
    }

    #[test]
    fn filter_excluded_platform_wins_over_all() {
        let c = vec![desc("X", &[Platform::Windows, Platform::All], &[Arch::X86], false)];
        let out = filter(
            &c,
            &set(&[Platform::Windows]),
            &[Arch::X86],
            &[Platform::Windows],
            &[],
            false,
        );
        assert!(out.is_empty());
    }

    #[test]
    fn filter_excluded_arch() {
        let c = vec![desc("X", &[Platform::Windows], &[Arch::X86, Arch::X64], false)];
        let out = filter(&c, &set(&[Platform::Windows]), &[Arch::X86], &[], &[Arch::X64], false);
        assert!(out.is_empty());
    }

    #[test]
    fn filter_privilege_rule() {
        let c = vec![desc("P", &[Platform::Windows], &[Arch::X86], true)];
        let target = set(&[Platform::Windows]);
        assert!(filter(&c, &target, &[Arch::X86], &[], &[], false).is_empty());
        assert_eq!(names(&filter(&c, &target, &[Arch::X86], &[], &[], true)), vec!["P"]);
    }

    #[test]
    fn filter_empty_arch_defaults_to_x86_not_wildcard() {
        let c = vec![
            desc("x86", &[Platform::Windows], &[Arch::X86], false),
            desc("x64", &[Platform::Windows], &[Arch::X64], false),
        ];
        let out = filter(&c, &set(&[Platform::Windows]), &[], &[], &[], false);
        assert_eq!(names(&out), vec!["x86"]);
    }

    #[test]
    fn filter_preserves_input_order() {
        let c = vec![
            desc("z", &[Platform::Windows], &[Arch::X86], false),
            desc("a", &[Platform::Windows], &[Arch::X86], false),
            desc("m", &[Platform::All], &[Arch::X86], false),
        ];
        let out = filter(&c, &set(&[Platform::Windows]), &[Arch::X86], &[], &[], false);
        assert_eq!(names(&out), vec!["z", "a", "m"]);
    }

    #[test]
    fn compatible_payloads_end_to_end() {
        let fixture = Fixture::new(vec![
            desc("A", &[Platform::Windows], &[Arch::X86], false),
            desc("B", &[Platform::Linux], &[Arch::X86], false),
        ]);
        let matcher = CompatibilityMatcher::new(&fixture, &fixture, &AlwaysCompatible, false);
        let out = matcher
            .compatible_payloads(&set(&[Platform::Windows]), &[Arch::X86], &[], &[])
            .unwrap();
        let names: Vec<&str> = out.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A"]);
        assert_eq!(out[0].factory.ref_name(), "A");
    }

    #[test]
    fn privileged_instance_rejected_for_unprivileged_module() {
        let fixture = Fixture::new(vec![desc("P", &[Platform::Windows], &[Arch::X86], true)]);
        let unprivileged = CompatibilityMatcher::new(&fixture, &fixture, &AlwaysCompatible, false);
        assert!(!unprivileged.is_payload_compatible("P"));
        let privileged = CompatibilityMatcher::new(&fixture, &fixture, &AlwaysCompatible, true);
        assert!(privileged.is_payload_compatible("P"));
    }

    #[test]
    fn descriptor_privilege_checked_too() {
        let fixture = Fixture::new(vec![desc("P", &[Platform::Windows], &[Arch::X86], false)]);
        let matcher = CompatibilityMatcher::new(&fixture, &fixture, &AlwaysCompatible, false);
        assert!(matcher.is_compatible(&fixture.descriptors[0]));
        let flagged = desc("P", &[Platform::Windows], &[Arch::X86], true);
        assert!(!matcher.is_compatible(&flagged));
    }

    #[test]
    fn unknown_payload_is_incompatible_not_an_error() {
        let fixture = Fixture::new(vec![]);
        let matcher = CompatibilityMatcher::new(&fixture, &fixture, &AlwaysCompatible, true);
        assert!(!matcher.is_payload_compatible("nope"));
    }

    #[test]
    fn keyword_predicate_filters_candidates() {
        let mut fixture = Fixture::new(vec![
            desc("bind", &[Platform::Windows], &[Arch::X86], false),
            desc("find", &[Platform::Windows], &[Arch::X86], false),
        ]);
        for (name, conn) in [("bind", "bind"), ("find", "find")] {
            fixture
                .payloads
                .get_mut(name)
                .unwrap()
                .compat
                .insert("ConnectionType".into(), conn.into());
        }
        let compat = KeywordCompat::new(
            [("ConnectionType".to_string(), "-find".to_string())]
                .into_iter()
                .collect(),
        );
        let matcher = CompatibilityMatcher::new(&fixture, &fixture, &compat, false);
        let out = matcher
            .compatible_payloads(&set(&[Platform::Windows]), &[Arch::X86], &[], &[])
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "bind");
    }
}
