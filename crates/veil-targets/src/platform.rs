//! Platform identifiers and platform sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An operating environment a target runs or a payload executes in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    /// Wildcard: a payload supporting it matches any platform query.
    All,
    Windows,
    Linux,
    Osx,
    Unix,
    Bsd,
    Solaris,
    Android,
    Java,
    Python,
    Php,
    Ruby,
    Nodejs,
    Other(String),
}

impl Platform {
    pub fn as_str(&self) -> &str {
        match self {
            Platform::All => "All",
            Platform::Windows => "Windows",
            Platform::Linux => "Linux",
            Platform::Osx => "OSX",
            Platform::Unix => "Unix",
            Platform::Bsd => "BSD",
            Platform::Solaris => "Solaris",
            Platform::Android => "Android",
            Platform::Java => "Java",
            Platform::Python => "Python",
            Platform::Php => "PHP",
            Platform::Ruby => "Ruby",
            Platform::Nodejs => "NodeJS",
            Platform::Other(s) => s,
        }
    }
}

impl FromStr for Platform {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let platform = match s.trim().to_ascii_lowercase().as_str() {
            "all" => Platform::All,
            "windows" | "win" => Platform::Windows,
            "linux" => Platform::Linux,
            "osx" | "macos" | "darwin" => Platform::Osx,
            "unix" => Platform::Unix,
            "bsd" | "freebsd" | "openbsd" | "netbsd" => Platform::Bsd,
            "solaris" => Platform::Solaris,
            "android" => Platform::Android,
            "java" => Platform::Java,
            "python" => Platform::Python,
            "php" => Platform::Php,
            "ruby" => Platform::Ruby,
            "nodejs" => Platform::Nodejs,
            _ => Platform::Other(s.trim().to_string()),
        };
        Ok(platform)
    }
}

impl From<String> for Platform {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(platform) => platform,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for Platform {
    fn from(s: &str) -> Self {
        Platform::from(s.to_string())
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.as_str().to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An insertion-ordered set of platforms.
///
/// Equality is set-based: order of insertion does not matter.
#[derive(Debug, Clone, Default, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Platform>", into = "Vec<Platform>")]
pub struct PlatformSet {
    platforms: Vec<Platform>,
}

impl PlatformSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set holding only the wildcard.
    pub fn all() -> Self {
        Self {
            platforms: vec![Platform::All],
        }
    }

    /// Insert a platform; returns `false` if it was already present.
    pub fn insert(&mut self, platform: Platform) -> bool {
        if self.platforms.contains(&platform) {
            return false;
        }
        self.platforms.push(platform);
        true
    }

    /// Exact membership (no wildcard expansion).
    pub fn contains(&self, platform: &Platform) -> bool {
        self.platforms.contains(platform)
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter()
    }

    /// Display names in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.platforms.iter().map(|p| p.to_string()).collect()
    }

    /// Whether the two sets share at least one exact member.
    pub fn intersects(&self, other: &PlatformSet) -> bool {
        self.platforms.iter().any(|p| other.contains(p))
    }

    /// A copy of this set with the wildcard added, as used for index queries.
    pub fn with_all(&self) -> PlatformSet {
        let mut set = self.clone();
        set.insert(Platform::All);
        set
    }

    /// Query match: this (supported) set satisfies `query` if it intersects
    /// `query ∪ {All}`. A set supporting `All` therefore matches any query.
    pub fn supports_any_of(&self, query: &PlatformSet) -> bool {
        self.intersects(&query.with_all())
    }
}

impl PartialEq for PlatformSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.platforms.iter().all(|p| other.contains(p))
    }
}

impl FromIterator<Platform> for PlatformSet {
    fn from_iter<I: IntoIterator<Item = Platform>>(iter: I) -> Self {
        let mut set = PlatformSet::new();
        for p in iter {
            set.insert(p);
        }
        set
    }
}

impl From<Vec<Platform>> for PlatformSet {
    fn from(platforms: Vec<Platform>) -> Self {
        platforms.into_iter().collect()
    }
}

impl From<PlatformSet> for Vec<Platform> {
    fn from(set: PlatformSet) -> Self {
        set.platforms
    }
}

impl fmt::Display for PlatformSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(", "))
    }
}
