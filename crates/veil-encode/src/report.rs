//! Summary of one encoding pipeline run.

use std::fmt;

use serde::Serialize;

use crate::pipeline::PipelineStage;

/// What a pipeline run did, filled in as it progresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncodeReport {
    /// Effective target name.
    pub target: Option<String>,
    /// Effective payload reference name.
    pub payload: Option<String>,
    /// Whether the payload was reconfigured as a generic payload.
    pub reconfigured: bool,
    /// Encoder that produced the artifact.
    pub encoder: Option<String>,
    pub raw_size: Option<usize>,
    pub encoded_size: Option<usize>,
    /// Stages entered, in order, starting after `Idle`.
    pub stages: Vec<PipelineStage>,
    /// Rendered error when the run aborted.
    pub error: Option<String>,
}

impl EncodeReport {
    pub fn last_stage(&self) -> PipelineStage {
        self.stages.last().copied().unwrap_or(PipelineStage::Idle)
    }

    pub fn completed(&self) -> bool {
        self.last_stage() == PipelineStage::Complete
    }
}

impl fmt::Display for EncodeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Encode Report ===")?;
        writeln!(f, "Target: {}", self.target.as_deref().unwrap_or("(none)"))?;
        writeln!(f, "Payload: {}", self.payload.as_deref().unwrap_or("(none)"))?;
        if self.reconfigured {
            writeln!(f, "  (generic payload reconfigured)")?;
        }
        if let Some(encoder) = &self.encoder {
            writeln!(f, "Encoder: {encoder}")?;
        }
        if let (Some(raw), Some(encoded)) = (self.raw_size, self.encoded_size) {
            writeln!(f, "Size: {raw} -> {encoded} bytes")?;
        }
        let stages: Vec<&str> = self.stages.iter().map(|s| s.as_str()).collect();
        writeln!(f, "Stages: {}", stages.join(" -> "))?;
        if let Some(error) = &self.error {
            writeln!(f, "Error: {error}")?;
        }
        Ok(())
    }
}
