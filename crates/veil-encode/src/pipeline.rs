//! Encoding pipeline orchestrator.
//!
//! `Idle -> RequirementsReady -> PreEncodeHookRun -> Encoded ->
//! PostEncodeHookRun -> Complete`, with `Aborted` reachable from any stage.

use serde::Serialize;
use tracing::debug;
use veil_core::ConfigurationView;
use veil_registry::PayloadRef;
use veil_targets::{Arch, PlatformSet, Target};

use crate::encoder::{EncodedArtifact, Encoder};
use crate::error::PipelineError;
use crate::hooks::EncodeHooks;
use crate::report::EncodeReport;
use crate::requirements::RequirementsAssembler;

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Idle,
    RequirementsReady,
    PreEncodeHookRun,
    Encoded,
    PostEncodeHookRun,
    Complete,
    Aborted,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::RequirementsReady => "requirements-ready",
            PipelineStage::PreEncodeHookRun => "pre-encode-hook",
            PipelineStage::Encoded => "encoded",
            PipelineStage::PostEncodeHookRun => "post-encode-hook",
            PipelineStage::Complete => "complete",
            PipelineStage::Aborted => "aborted",
        }
    }
}

/// Per-call arguments of [`EncodingPipeline::generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest<'t> {
    /// Explicit payload instance; wins over `current`.
    pub payload: Option<PayloadRef>,
    /// The module's currently held payload instance.
    pub current: Option<PayloadRef>,
    /// Platform override for generic payloads.
    pub platform: Option<PlatformSet>,
    /// Architecture override for generic payloads.
    pub arch: Option<Vec<Arch>>,
    /// Explicit target; wins over the pipeline's resolved target.
    pub target: Option<&'t Target>,
}

impl<'t> GenerateRequest<'t> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, payload: Option<PayloadRef>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_current(mut self, current: Option<PayloadRef>) -> Self {
        self.current = current;
        self
    }

    pub fn with_platform(mut self, platform: Option<PlatformSet>) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_arch(mut self, arch: Option<Vec<Arch>>) -> Self {
        self.arch = arch;
        self
    }

    pub fn with_target(mut self, target: Option<&'t Target>) -> Self {
        self.target = target;
        self
    }
}

/// Drives one payload through requirements assembly, hooks, and the
/// injected encoder.
pub struct EncodingPipeline<'a> {
    assembler: RequirementsAssembler<'a>,
    datastore: &'a dyn ConfigurationView,
    encoder: &'a dyn Encoder,
    resolved_target: Option<&'a Target>,
    stage: PipelineStage,
    report: EncodeReport,
}

impl<'a> EncodingPipeline<'a> {
    pub fn new(
        assembler: RequirementsAssembler<'a>,
        datastore: &'a dyn ConfigurationView,
        encoder: &'a dyn Encoder,
    ) -> Self {
        Self {
            assembler,
            datastore,
            encoder,
            resolved_target: None,
            stage: PipelineStage::Idle,
            report: EncodeReport::default(),
        }
    }

    /// The module's resolved target, used when a request names none.
    pub fn with_resolved_target(mut self, target: Option<&'a Target>) -> Self {
        self.resolved_target = target;
        self
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Report of the most recent run.
    pub fn report(&self) -> &EncodeReport {
        &self.report
    }

    pub fn into_report(self) -> EncodeReport {
        self.report
    }

    /// Encode a payload. Failures are final for this call; nothing is
    /// retried.
    pub fn generate(
        &mut self,
        hooks: &mut dyn EncodeHooks,
        request: GenerateRequest<'_>,
    ) -> Result<EncodedArtifact, PipelineError> {
        self.stage = PipelineStage::Idle;
        self.report = EncodeReport::default();

        match self.run(hooks, request) {
            Ok(artifact) => Ok(artifact),
            Err(e) => {
                debug!(from = self.stage.as_str(), error = %e, "encode aborted");
                self.report.error = Some(e.to_string());
                self.advance(PipelineStage::Aborted);
                Err(e)
            }
        }
    }

    fn advance(&mut self, stage: PipelineStage) {
        if stage != PipelineStage::Aborted {
            debug!(stage = stage.as_str(), "encode stage");
        }
        self.stage = stage;
        self.report.stages.push(stage);
    }

    fn run(
        &mut self,
        hooks: &mut dyn EncodeHooks,
        request: GenerateRequest<'_>,
    ) -> Result<EncodedArtifact, PipelineError> {
        let target = request.target.or(self.resolved_target);
        self.report.target = target.map(|t| t.name.clone());

        let mut payload = request
            .payload
            .or(request.current)
            .ok_or(PipelineError::MissingPayload)?;

        let platform = request.platform;
        let arch = request.arch;
        let reconfigured = payload
            .as_generic()
            .map(|generic| generic.reconfigure(platform, arch));
        if let Some(next) = reconfigured {
            debug!(payload = next.name(), platform = %next.platform(), "reconfigured generic payload");
            payload = next;
            self.report.reconfigured = true;
        }
        self.report.payload = Some(payload.name().to_string());

        let mut reqs = self.assembler.assemble(self.datastore);
        self.advance(PipelineStage::RequirementsReady);

        hooks.encode_begin(&mut payload, &mut reqs)?;
        self.advance(PipelineStage::PreEncodeHookRun);

        let encoded = self.encoder.encode(payload.as_ref(), &reqs)?;
        self.report.raw_size = Some(encoded.raw_size);
        self.advance(PipelineStage::Encoded);

        let artifact = hooks.encode_end(&payload, &reqs, encoded)?;
        self.advance(PipelineStage::PostEncodeHookRun);

        self.report.payload = Some(payload.name().to_string());
        self.report.encoder = artifact.encoder.clone();
        self.report.encoded_size = Some(artifact.len());
        self.advance(PipelineStage::Complete);
        Ok(artifact)
    }
}
