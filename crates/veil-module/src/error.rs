//! Module errors.

use std::path::PathBuf;

use thiserror::Error;
use veil_core::CoreError;
use veil_encode::PipelineError;
use veil_registry::RegistryError;
use veil_targets::TargetError;

/// Errors raised while loading, configuring, or running an evasion module.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module definition not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("invalid module definition: {detail}")]
    InvalidDefinition { detail: String },

    #[error("payload '{name}' is not known to the registry")]
    UnknownPayload { name: String },

    #[error("artifact store rejected '{filename}': {detail}")]
    Store { filename: String, detail: String },

    #[error(transparent)]
    Config(#[from] CoreError),

    #[error(transparent)]
    Targets(#[from] TargetError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for module operations.
pub type Result<T> = std::result::Result<T, ModuleError>;
