//! The evasion module base.
//!
//! [`EvasionModule`] owns everything a single module instance needs: its
//! definition, datastore, target list, compatibility keywords, and the
//! cached payload instance and artifact of its last generation. Nothing is
//! shared between instances; collaborators (index, registry, encoder,
//! artifact store) are passed in per call.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info};
use veil_core::{
    ConfigurationView, CoreError, DataStore, ModuleRef, ModuleType, OptValue, OptionSet,
    OptionSpec,
};
use veil_encode::{
    EncodeHooks, EncodeReport, EncodedArtifact, Encoder, EncodingPipeline, GenerateRequest,
    PipelineError, RequirementsAssembler,
};
use veil_registry::{
    probe_payload, CompatibilityMatcher, CompatiblePayload, KeywordCompat, MetadataIndex,
    PayloadRef, PayloadRegistry,
};
use veil_targets::{
    require_valid, Arch, AutoTargetable, Platform, PlatformSet, Target, TargetList,
    TargetResolver,
};

use crate::definition::ModuleInfo;
use crate::error::{ModuleError, Result};
use crate::store::ArtifactStore;

/// Datastore key naming the output file.
pub const FILENAME_KEY: &str = "FILENAME";

/// Owned auto-targeting capability.
pub type AutoTarget = Box<dyn AutoTargetable + Send + Sync>;

/// Whether a module waits for input or acts on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stance {
    Passive,
    Aggressive,
}

/// A configured evasion module instance.
pub struct EvasionModule {
    info: ModuleInfo,
    module_ref: ModuleRef,
    options: OptionSet,
    datastore: DataStore,
    targets: TargetList,
    compat: KeywordCompat,
    auto: Option<AutoTarget>,
    payload_instance: Option<PayloadRef>,
    encoded: Option<EncodedArtifact>,
    last_report: Option<EncodeReport>,
}

impl fmt::Debug for EvasionModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvasionModule")
            .field("module", &self.module_ref)
            .field("targets", &self.targets.len())
            .field("auto_target", &self.auto.is_some())
            .field("payload", &self.payload_instance.as_ref().map(|p| p.name().to_string()))
            .finish()
    }
}

impl EvasionModule {
    /// Build a module without auto-targeting.
    pub fn new(info: ModuleInfo) -> Result<Self> {
        Self::with_auto_target(info, None)
    }

    /// Build a module, optionally with an auto-targeting capability.
    ///
    /// Merges payload compatibility keywords into the module's, registers
    /// `FILENAME` ahead of the definition's own options, and synthesizes an
    /// "Automatic" target when the module has a remote-host option and the
    /// capability but declares no default target.
    pub fn with_auto_target(mut info: ModuleInfo, auto: Option<AutoTarget>) -> Result<Self> {
        info.merge_payload_compat();
        require_valid(&info.targets, info.default_target)?;

        let mut options = OptionSet::new();
        options.register(OptionSpec::filename());
        for spec in &info.options {
            options.register(spec.clone());
        }
        let mut datastore = DataStore::new();
        datastore.import_defaults(&options);

        let mut targets = TargetList::new(info.targets.clone()).with_default(info.default_target);
        if auto.is_some() && options.has_remote_host() {
            targets.synthesize_automatic();
        }
        if targets.default_index().is_none() {
            targets = targets.with_default(Some(0));
        }

        let compat = KeywordCompat::new(info.compat.payload.clone());
        let module_ref = ModuleRef::new(ModuleType::Evasion, info.refname.clone());
        debug!(
            module = %module_ref,
            targets = targets.len(),
            synthesized = targets.synthesized_index().is_some(),
            "module constructed"
        );

        Ok(Self {
            info,
            module_ref,
            options,
            datastore,
            targets,
            compat,
            auto,
            payload_instance: None,
            encoded: None,
            last_report: None,
        })
    }

    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    pub fn module_ref(&self) -> &ModuleRef {
        &self.module_ref
    }

    pub fn module_type(&self) -> ModuleType {
        ModuleType::Evasion
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn shortname(&self) -> &str {
        self.module_ref.shortname()
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn datastore(&self) -> &DataStore {
        &self.datastore
    }

    pub fn datastore_mut(&mut self) -> &mut DataStore {
        &mut self.datastore
    }

    /// Set a datastore value.
    pub fn set(&mut self, key: &str, value: impl Into<OptValue>) {
        self.datastore.set(key, value);
    }

    /// Check the datastore against the registered options.
    pub fn validate_options(&self) -> Result<()> {
        self.options.validate(&self.datastore)?;
        Ok(())
    }

    pub fn targets(&self) -> &TargetList {
        &self.targets
    }

    /// Whether the target list carries an automatic-named entry.
    pub fn has_auto_target(&self) -> bool {
        self.targets.has_auto_target()
    }

    pub fn privileged(&self) -> bool {
        self.info.privileged
    }

    /// Seconds a payload may stay active, if the module limits it.
    pub fn active_timeout(&self) -> Option<u64> {
        self.info.payload.active_timeout
    }

    pub fn stance(&self) -> Stance {
        Stance::Passive
    }

    pub fn is_passive(&self) -> bool {
        self.stance() == Stance::Passive
    }

    pub fn is_aggressive(&self) -> bool {
        self.stance() == Stance::Aggressive
    }

    fn resolver(&self) -> TargetResolver<'_> {
        TargetResolver::new(&self.targets)
            .with_auto_target(self.auto.as_deref().map(|a| a as &dyn AutoTargetable))
    }

    /// The active target, if any.
    pub fn target(&self) -> Option<&Target> {
        self.resolver().resolve(&self.datastore)
    }

    /// Position of the active target, after auto-targeting.
    pub fn target_index(&self) -> Option<usize> {
        self.resolver().resolve_index(&self.datastore)
    }

    /// The active target's platform, or the module's own.
    pub fn target_platform(&self) -> PlatformSet {
        self.target()
            .filter(|t| !t.platform.is_empty())
            .map(|t| t.platform.clone())
            .unwrap_or_else(|| self.info.platform.clone())
    }

    /// The active target's architecture, or the module's own; `None` when
    /// neither declares one.
    pub fn target_arch(&self) -> Option<Vec<Arch>> {
        match self.target().filter(|t| !t.arch.is_empty()) {
            Some(t) => Some(t.arch.clone()),
            None if !self.info.arch.is_empty() => Some(self.info.arch.clone()),
            None => None,
        }
    }

    /// Platform and architecture to match payloads against, with x86 as
    /// the final architecture default.
    pub fn normalize_platform_arch(&self) -> (PlatformSet, Vec<Arch>) {
        let arch = self.target_arch().unwrap_or_else(|| vec![Arch::BASELINE]);
        (self.target_platform(), arch)
    }

    /// Whether the named payload can be used with this module.
    pub fn is_payload_compatible(&self, registry: &dyn PayloadRegistry, name: &str) -> bool {
        probe_payload(registry, &self.compat, self.info.privileged, name).is_some()
    }

    /// Payloads deliverable to the active target, in index order.
    pub fn compatible_payloads(
        &self,
        index: &dyn MetadataIndex,
        registry: &dyn PayloadRegistry,
        excluded_platforms: &[Platform],
        excluded_archs: &[Arch],
    ) -> Result<Vec<CompatiblePayload>> {
        let (platform, arch) = self.normalize_platform_arch();
        let matcher = CompatibilityMatcher::new(index, registry, &self.compat, self.info.privileged);
        Ok(matcher.compatible_payloads(&platform, &arch, excluded_platforms, excluded_archs)?)
    }

    /// Instantiate `name` as the current payload if it is compatible.
    /// Returns `false` (leaving the current payload alone) when it is not.
    pub fn select_payload(&mut self, registry: &dyn PayloadRegistry, name: &str) -> Result<bool> {
        let factory = registry
            .lookup(name)
            .ok_or_else(|| ModuleError::UnknownPayload {
                name: name.to_string(),
            })?;
        if !self.is_payload_compatible(registry, name) {
            return Ok(false);
        }
        self.payload_instance = Some(factory.create());
        Ok(true)
    }

    pub fn payload_instance(&self) -> Option<&PayloadRef> {
        self.payload_instance.as_ref()
    }

    pub fn set_payload_instance(&mut self, payload: Option<PayloadRef>) {
        self.payload_instance = payload;
    }

    /// Artifact of the last successful [`generate_payload`](Self::generate_payload).
    pub fn encoded_payload(&self) -> Option<&EncodedArtifact> {
        self.encoded.as_ref()
    }

    /// Report of the last [`generate_payload`](Self::generate_payload), failed or not.
    pub fn last_encode_report(&self) -> Option<&EncodeReport> {
        self.last_report.as_ref()
    }

    fn requirements(&self) -> RequirementsAssembler<'_> {
        RequirementsAssembler::new(
            &self.info.payload,
            &self.info.save_registers,
            &self.module_ref,
        )
    }

    fn run_pipeline(
        &self,
        encoder: &dyn Encoder,
        hooks: &mut dyn EncodeHooks,
        mut request: GenerateRequest<'_>,
    ) -> (std::result::Result<EncodedArtifact, PipelineError>, EncodeReport) {
        if request.current.is_none() {
            request.current = self.payload_instance.clone();
        }
        let mut pipeline = EncodingPipeline::new(self.requirements(), &self.datastore, encoder)
            .with_resolved_target(self.target());
        let result = pipeline.generate(hooks, request);
        (result, pipeline.into_report())
    }

    /// Encode a payload without touching the module's cached state.
    pub fn generate_single_payload(
        &self,
        encoder: &dyn Encoder,
        hooks: &mut dyn EncodeHooks,
        request: GenerateRequest<'_>,
    ) -> Result<EncodedArtifact> {
        let (result, _) = self.run_pipeline(encoder, hooks, request);
        Ok(result?)
    }

    /// Encode `payload` (or the current payload instance) and cache the
    /// artifact. A supplied instance becomes the current one on success.
    pub fn generate_payload(
        &mut self,
        encoder: &dyn Encoder,
        hooks: &mut dyn EncodeHooks,
        payload: Option<PayloadRef>,
    ) -> Result<&EncodedArtifact> {
        let request = GenerateRequest::new().with_payload(payload.clone());
        let (result, report) = self.run_pipeline(encoder, hooks, request);
        self.last_report = Some(report);
        let artifact = result?;
        if payload.is_some() {
            self.payload_instance = payload;
        }
        Ok(&*self.encoded.insert(artifact))
    }

    /// The configured output filename.
    pub fn file_format_filename(&self) -> Option<String> {
        self.datastore.get_string(FILENAME_KEY)
    }

    /// Loot type under which this module's files are stored.
    pub fn loot_type(&self) -> String {
        format!("evasion.fileformat.{}", self.shortname())
    }

    /// Persist `data` under the configured filename.
    pub fn file_create(&self, data: &[u8], store: &mut dyn ArtifactStore) -> Result<PathBuf> {
        let filename = self
            .file_format_filename()
            .ok_or_else(|| CoreError::MissingRequired {
                names: vec![FILENAME_KEY.to_string()],
            })?;
        let path = store.store_local(&self.loot_type(), None, data, &filename)?;
        info!(
            module = %self.module_ref,
            bytes = data.len(),
            "{filename} stored at {}",
            path.display()
        );
        Ok(path)
    }
}
