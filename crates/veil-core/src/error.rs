//! Error types for datastore and option operations.

use std::path::PathBuf;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// TOML deserialization error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error reading a configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file not found.
    #[error("configuration file not found: {}", path.display())]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// A value could not be used for the option it was assigned to.
    #[error("invalid value for option '{name}': {detail}")]
    InvalidOption {
        /// Option name.
        name: String,
        /// Why the value was rejected.
        detail: String,
    },

    /// Required options have no value and no default.
    #[error("required options not set: {}", names.join(", "))]
    MissingRequired {
        /// Names of the unset options.
        names: Vec<String>,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
