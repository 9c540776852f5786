//! Architecture identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An architecture a target runs on or a payload supports.
///
/// Unknown spellings are preserved as [`Arch::Other`] so catalogs can carry
/// architectures this crate does not enumerate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Arch {
    X86,
    X64,
    Armle,
    Armbe,
    Aarch64,
    Mipsle,
    Mipsbe,
    Ppc,
    Sparc,
    Cmd,
    Php,
    Java,
    Python,
    Ruby,
    Nodejs,
    Other(String),
}

impl Arch {
    /// The architecture assumed when neither target nor module names one.
    pub const BASELINE: Arch = Arch::X86;

    pub fn as_str(&self) -> &str {
        match self {
            Arch::X86 => "x86",
            Arch::X64 => "x64",
            Arch::Armle => "armle",
            Arch::Armbe => "armbe",
            Arch::Aarch64 => "aarch64",
            Arch::Mipsle => "mipsle",
            Arch::Mipsbe => "mipsbe",
            Arch::Ppc => "ppc",
            Arch::Sparc => "sparc",
            Arch::Cmd => "cmd",
            Arch::Php => "php",
            Arch::Java => "java",
            Arch::Python => "python",
            Arch::Ruby => "ruby",
            Arch::Nodejs => "nodejs",
            Arch::Other(s) => s,
        }
    }
}

impl FromStr for Arch {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let arch = match s.trim().to_ascii_lowercase().as_str() {
            "x86" | "i386" | "i686" => Arch::X86,
            "x64" | "x86_64" | "amd64" => Arch::X64,
            "armle" | "arm" => Arch::Armle,
            "armbe" => Arch::Armbe,
            "aarch64" | "arm64" => Arch::Aarch64,
            "mipsle" => Arch::Mipsle,
            "mipsbe" | "mips" => Arch::Mipsbe,
            "ppc" => Arch::Ppc,
            "sparc" => Arch::Sparc,
            "cmd" => Arch::Cmd,
            "php" => Arch::Php,
            "java" => Arch::Java,
            "python" => Arch::Python,
            "ruby" => Arch::Ruby,
            "nodejs" => Arch::Nodejs,
            other => Arch::Other(other.to_string()),
        };
        Ok(arch)
    }
}

impl From<String> for Arch {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(arch) => arch,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for Arch {
    fn from(s: &str) -> Self {
        Arch::from(s.to_string())
    }
}

impl From<Arch> for String {
    fn from(arch: Arch) -> Self {
        arch.as_str().to_string()
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
