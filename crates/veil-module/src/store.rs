//! Persistence of generated artifacts.
//!
//! The `ArtifactStore` trait abstracts over where files produced by a
//! module end up. `LocalStore` writes them into a directory.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ModuleError, Result};

/// Destination for files a module produces.
pub trait ArtifactStore {
    /// Persist `data` under `filename`, tagged with a loot type such as
    /// `evasion.fileformat.windows_defender_exe`. Returns the stored path.
    fn store_local(
        &mut self,
        ltype: &str,
        content_type: Option<&str>,
        data: &[u8],
        filename: &str,
    ) -> Result<PathBuf>;
}

/// Directory-backed store.
///
/// Layout:
/// ```text
/// <root>/
///   <filename>
/// ```
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at the given directory.
    pub fn new(root: PathBuf) -> Self {
        LocalStore { root }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reduce a requested name to a single path component.
fn sanitize(filename: &str) -> Result<&str> {
    let name = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty());
    match name {
        Some(n) if n == filename => Ok(n),
        _ => Err(ModuleError::Store {
            filename: filename.to_string(),
            detail: "must be a plain file name".into(),
        }),
    }
}

impl ArtifactStore for LocalStore {
    fn store_local(
        &mut self,
        ltype: &str,
        content_type: Option<&str>,
        data: &[u8],
        filename: &str,
    ) -> Result<PathBuf> {
        let name = sanitize(filename)?;
        std::fs::create_dir_all(&self.root)?;
        let path = self.root.join(name);
        std::fs::write(&path, data)?;
        debug!(ltype, content_type, bytes = data.len(), path = %path.display(), "stored artifact");
        Ok(path)
    }
}
