//! Results of running an evasion module.
//!
//! A module run ends in one of three ways: it produced an artifact, it
//! declared a failure with a reason, or it declared early completion.
//! Modules return `Err(Failure)` from anywhere in their run to abort.

use std::fmt;

use serde::Serialize;
use veil_encode::{EncodedArtifact, PipelineError};

use crate::error::ModuleError;

/// Why a module run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    None,
    Unknown,
    BadConfig,
    NoTarget,
    NotFound,
    NoAccess,
    PayloadFailed,
    TimeoutExpired,
    UserInterrupt,
}

impl FailureReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureReason::None => "none",
            FailureReason::Unknown => "unknown",
            FailureReason::BadConfig => "bad-config",
            FailureReason::NoTarget => "no-target",
            FailureReason::NotFound => "not-found",
            FailureReason::NoAccess => "no-access",
            FailureReason::PayloadFailed => "payload-failed",
            FailureReason::TimeoutExpired => "timeout-expired",
            FailureReason::UserInterrupt => "user-interrupt",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A module-declared failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub reason: FailureReason,
    pub detail: Option<String>,
}

impl Failure {
    pub fn new(reason: FailureReason, detail: Option<String>) -> Self {
        Self { reason, detail }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.reason),
            None => write!(f, "{}", self.reason),
        }
    }
}

impl std::error::Error for Failure {}

impl From<ModuleError> for Failure {
    fn from(e: ModuleError) -> Self {
        let reason = match &e {
            ModuleError::Pipeline(PipelineError::MissingPayload) => FailureReason::BadConfig,
            ModuleError::Pipeline(_) => FailureReason::PayloadFailed,
            ModuleError::Config(_) | ModuleError::InvalidDefinition { .. } => FailureReason::BadConfig,
            ModuleError::UnknownPayload { .. } | ModuleError::NotFound { .. } => FailureReason::NotFound,
            ModuleError::Store { .. } | ModuleError::Io(_) => FailureReason::NoAccess,
            _ => FailureReason::Unknown,
        };
        Failure::new(reason, Some(e.to_string()))
    }
}

/// Abort the current run with `reason`.
pub fn fail_with<T>(reason: FailureReason, detail: impl Into<String>) -> Result<T, Failure> {
    Err(Failure::new(reason, Some(detail.into())))
}

/// How a module run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run produced an artifact.
    Ok(EncodedArtifact),
    /// The module declared a failure.
    Failed(Failure),
    /// The module finished early without an artifact.
    Completed,
}

impl RunOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, RunOutcome::Failed(_))
    }

    pub fn artifact(&self) -> Option<&EncodedArtifact> {
        match self {
            RunOutcome::Ok(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// What a module's run body returns.
pub type RunResult = Result<RunOutcome, Failure>;
