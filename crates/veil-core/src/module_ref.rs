//! Module identity handed to collaborators for context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of framework module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Exploit,
    Auxiliary,
    Payload,
    Encoder,
    Nop,
    Post,
    Evasion,
}

impl ModuleType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleType::Exploit => "exploit",
            ModuleType::Auxiliary => "auxiliary",
            ModuleType::Payload => "payload",
            ModuleType::Encoder => "encoder",
            ModuleType::Nop => "nop",
            ModuleType::Post => "post",
            ModuleType::Evasion => "evasion",
        }
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reference to the module driving an encode, e.g. `windows/applocker_bypass`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleRef {
    /// Reference name relative to the module type directory.
    pub refname: String,
    pub module_type: ModuleType,
}

impl ModuleRef {
    pub fn new(module_type: ModuleType, refname: impl Into<String>) -> Self {
        Self {
            refname: refname.into(),
            module_type,
        }
    }

    /// `<type>/<refname>`.
    pub fn fullname(&self) -> String {
        format!("{}/{}", self.module_type, self.refname)
    }

    /// Final path segment of the reference name.
    pub fn shortname(&self) -> &str {
        self.refname.rsplit('/').next().unwrap_or(&self.refname)
    }
}

impl fmt::Display for ModuleRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module_type, self.refname)
    }
}
