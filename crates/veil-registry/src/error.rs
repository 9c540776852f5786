//! Registry error types.

use std::path::PathBuf;

/// Errors that can occur while loading catalogs or querying the index.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Catalog file not found.
    #[error("catalog not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The catalog parsed but is not usable.
    #[error("invalid catalog: {detail}")]
    InvalidCatalog { detail: String },

    /// The metadata index could not answer a query.
    #[error("metadata index unavailable: {detail}")]
    IndexUnavailable { detail: String },

    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
