//! TOML-backed payload catalog.
//!
//! Serves as both the [`MetadataIndex`] and the [`PayloadRegistry`] for a
//! fixed set of payloads declared in a file:
//!
//! ```toml
//! [[payload]]
//! ref-name = "windows/x64/exec"
//! supported-platforms = ["windows"]
//! supported-archs = ["x64"]
//! bytes = "fc4883e4f0"
//!
//! [payload.compat]
//! ConnectionType = "none"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use veil_core::bytes::hex_bytes;
use veil_core::ModuleType;
use veil_targets::{Arch, PlatformSet};

use crate::descriptor::PayloadDescriptor;
use crate::error::{RegistryError, Result};
use crate::index::{IndexQuery, MetadataIndex};
use crate::payload::{FactoryRef, PayloadRegistry, StaticPayload, StaticPayloadFactory};

fn payload_type() -> ModuleType {
    ModuleType::Payload
}

/// A payload declaration in a catalog file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CatalogEntry {
    pub ref_name: String,
    #[serde(default = "payload_type")]
    pub module_type: ModuleType,
    pub supported_platforms: PlatformSet,
    pub supported_archs: Vec<Arch>,
    #[serde(default)]
    pub privileged: bool,
    /// Accepts platform/arch overrides at generation time.
    #[serde(default)]
    pub generic: bool,
    #[serde(default, with = "hex_bytes")]
    pub bytes: Vec<u8>,
    #[serde(default)]
    pub compat: BTreeMap<String, String>,
}

impl CatalogEntry {
    pub fn descriptor(&self) -> PayloadDescriptor {
        PayloadDescriptor {
            ref_name: self.ref_name.clone(),
            module_type: self.module_type,
            supported_platforms: self.supported_platforms.clone(),
            supported_archs: self.supported_archs.clone(),
            privileged: self.privileged,
            size: (!self.bytes.is_empty()).then_some(self.bytes.len() as u64),
        }
    }

    pub fn to_payload(&self) -> StaticPayload {
        StaticPayload {
            name: self.ref_name.clone(),
            platform: self.supported_platforms.clone(),
            arch: self.supported_archs.clone(),
            privileged: self.privileged,
            bytes: self.bytes.clone(),
            compat: self.compat.clone(),
            generic: self.generic,
        }
    }
}

/// A catalog of payload declarations, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "payload")]
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.ref_name == name)
    }

    /// Reject catalogs with duplicate or empty reference names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for e in &self.entries {
            if e.ref_name.trim().is_empty() {
                return Err(RegistryError::InvalidCatalog {
                    detail: "entry with empty ref-name".into(),
                });
            }
            if !seen.insert(e.ref_name.as_str()) {
                return Err(RegistryError::InvalidCatalog {
                    detail: format!("duplicate ref-name '{}'", e.ref_name),
                });
            }
        }
        Ok(())
    }
}

impl MetadataIndex for Catalog {
    fn query(&self, query: &IndexQuery) -> Result<Vec<PayloadDescriptor>> {
        Ok(self
            .entries
            .iter()
            .map(CatalogEntry::descriptor)
            .filter(|d| query.matches(d))
            .collect())
    }
}

impl PayloadRegistry for Catalog {
    fn lookup(&self, name: &str) -> Option<FactoryRef> {
        self.entry(name)
            .map(|e| Arc::new(StaticPayloadFactory::new(e.to_payload())) as FactoryRef)
    }
}

/// Parse and validate a catalog from a TOML string.
pub fn parse_catalog_toml(toml_str: &str) -> Result<Catalog> {
    let catalog: Catalog = toml::from_str(toml_str)?;
    catalog.validate()?;
    Ok(catalog)
}

/// Load a catalog from a file.
pub fn load_catalog_toml(path: &Path) -> Result<Catalog> {
    if !path.exists() {
        return Err(RegistryError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_catalog_toml(&content)
}
