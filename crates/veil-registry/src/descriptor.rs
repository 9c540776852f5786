//! Payload descriptors returned by the metadata index.

use serde::{Deserialize, Serialize};
use veil_core::ModuleType;
use veil_targets::{Arch, PlatformSet};

fn payload_type() -> ModuleType {
    ModuleType::Payload
}

/// Read-only metadata about a payload, fetched per query and never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadDescriptor {
    pub ref_name: String,
    #[serde(default = "payload_type")]
    pub module_type: ModuleType,
    pub supported_platforms: PlatformSet,
    pub supported_archs: Vec<Arch>,
    /// Whether the payload needs privileged execution.
    #[serde(default)]
    pub privileged: bool,
    /// Raw size in bytes, when known without generating.
    #[serde(default)]
    pub size: Option<u64>,
}

impl PayloadDescriptor {
    pub fn new(
        ref_name: impl Into<String>,
        supported_platforms: PlatformSet,
        supported_archs: Vec<Arch>,
    ) -> Self {
        Self {
            ref_name: ref_name.into(),
            module_type: ModuleType::Payload,
            supported_platforms,
            supported_archs,
            privileged: false,
            size: None,
        }
    }

    pub fn privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}
