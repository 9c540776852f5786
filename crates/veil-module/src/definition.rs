//! Evasion module definitions.
//!
//! A definition is a TOML document describing the module's identity,
//! platform, payload constraints, options, and targets:
//!
//! ```toml
//! name = "Microsoft Windows Defender Evasive Executable"
//! refname = "windows/windows_defender_exe"
//! platform = ["windows"]
//! arch = ["x86"]
//! default-target = 0
//!
//! [payload]
//! space = 2048
//! bad-chars = "00"
//!
//! [compat.payload]
//! ConnectionType = "-find"
//!
//! [[option]]
//! name = "RHOST"
//! kind = "address"
//!
//! [[target]]
//! name = "Microsoft Windows"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use veil_core::OptionSpec;
use veil_encode::PayloadInfo;
use veil_targets::{Arch, PlatformSet, Target, TargetsDocument};

use crate::error::{ModuleError, Result};

/// Module-level compatibility keyword tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleCompat {
    /// Keywords every payload must satisfy (`ConnectionType`, `Convention`, ...).
    #[serde(default)]
    pub payload: BTreeMap<String, String>,
}

/// Declarative description of an evasion module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleInfo {
    /// Display name.
    pub name: String,
    /// Reference name, e.g. `windows/applocker_evasion_install_util`.
    pub refname: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Platforms the module produces output for when no target narrows it.
    #[serde(default)]
    pub platform: PlatformSet,
    #[serde(default)]
    pub arch: Vec<Arch>,
    /// Whether the produced artifact runs with elevated privileges.
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub default_target: Option<i64>,
    /// Registers the NOP generator must preserve.
    #[serde(default)]
    pub save_registers: Vec<String>,
    #[serde(default)]
    pub payload: PayloadInfo,
    #[serde(default)]
    pub compat: ModuleCompat,
    #[serde(default, rename = "option")]
    pub options: Vec<OptionSpec>,
    #[serde(default, rename = "target")]
    pub targets: Vec<Target>,
}

impl ModuleInfo {
    /// A minimal definition with no targets.
    pub fn new(name: impl Into<String>, refname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            refname: refname.into(),
            description: String::new(),
            authors: Vec::new(),
            platform: PlatformSet::new(),
            arch: Vec::new(),
            privileged: false,
            default_target: None,
            save_registers: Vec::new(),
            payload: PayloadInfo::default(),
            compat: ModuleCompat::default(),
            options: Vec::new(),
            targets: Vec::new(),
        }
    }

    /// Fold the payload-level compatibility table into the module-level one.
    /// Payload entries win on conflicting keys.
    pub fn merge_payload_compat(&mut self) {
        for (key, value) in &self.payload.compat {
            self.compat.payload.insert(key.clone(), value.clone());
        }
    }

    /// Swap the inline target list for an external target document.
    ///
    /// The document's `default-target` replaces the module's even when it
    /// is absent, so the pair always comes from one source.
    pub fn replace_targets(&mut self, doc: TargetsDocument) {
        self.targets = doc.targets;
        self.default_target = doc.default_target;
    }

    fn check(&self) -> Result<()> {
        if self.refname.trim().is_empty() {
            return Err(ModuleError::InvalidDefinition {
                detail: "refname is empty".into(),
            });
        }
        if self.refname.starts_with('/') || self.refname.ends_with('/') {
            return Err(ModuleError::InvalidDefinition {
                detail: format!("refname '{}' has a leading or trailing '/'", self.refname),
            });
        }
        Ok(())
    }
}

/// Parse a module definition from a TOML string.
pub fn parse_module_toml(toml_str: &str) -> Result<ModuleInfo> {
    let info: ModuleInfo = toml::from_str(toml_str)?;
    info.check()?;
    Ok(info)
}

/// Load a module definition from a file.
pub fn load_module_toml(path: &Path) -> Result<ModuleInfo> {
    if !path.exists() {
        return Err(ModuleError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_module_toml(&content)
}
