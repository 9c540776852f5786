//! TOML parsing and validation for target definitions.
//!
//! A target document lists targets as an array of tables:
//!
//! ```toml
//! default-target = 0
//!
//! [[target]]
//! name = "Windows x64"
//! platform = ["windows"]
//! arch = ["x64"]
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TargetError};
use crate::target::Target;

/// A validation issue found in a target definition.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// On-disk form of a target list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetsDocument {
    #[serde(default)]
    pub default_target: Option<i64>,
    #[serde(default, rename = "target")]
    pub targets: Vec<Target>,
}

/// Parse a target document from a TOML string.
pub fn parse_targets_toml(toml_str: &str) -> Result<TargetsDocument> {
    let doc: TargetsDocument = toml::from_str(toml_str)?;
    Ok(doc)
}

/// Load a target document from a file.
pub fn load_targets_toml(path: &Path) -> Result<TargetsDocument> {
    if !path.exists() {
        return Err(TargetError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_targets_toml(&content)
}

/// Validate a declared target list.
///
/// Returns `Ok(())` if valid, or `Err(issues)` with a list of problems.
/// Issues with severity "warning" do not make a definition unusable.
pub fn validate_targets(
    targets: &[Target],
    default_target: Option<i64>,
) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    // 1. Names are non-empty
    for (i, t) in targets.iter().enumerate() {
        if t.name.trim().is_empty() {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!("target {i} has an empty name"),
            });
        }
    }

    // 2. Names are unique (name lookup returns the first match)
    let mut seen = HashSet::new();
    for t in targets {
        if !t.name.is_empty() && !seen.insert(t.name.as_str()) {
            issues.push(ValidationIssue {
                severity: "warning",
                message: format!(
                    "duplicate target name '{}': only the first is selectable by name",
                    t.name
                ),
            });
        }
    }

    // 3. Declared targets are never marked auto-generated
    for t in targets.iter().filter(|t| t.auto_generated) {
        issues.push(ValidationIssue {
            severity: "error",
            message: format!("target '{}' is declared as auto-generated", t.name),
        });
    }

    // 4. Default index is in range
    if let Some(d) = default_target {
        if d >= 0 && d as usize >= targets.len() {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!(
                    "default target {d} is out of range ({} targets)",
                    targets.len()
                ),
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Fold validation issues into an error if any has severity "error".
pub fn require_valid(targets: &[Target], default_target: Option<i64>) -> Result<()> {
    match validate_targets(targets, default_target) {
        Ok(()) => Ok(()),
        Err(issues) => {
            let errors: Vec<String> = issues
                .into_iter()
                .filter(|i| i.severity == "error")
                .map(|i| i.message)
                .collect();
            if errors.is_empty() {
                Ok(())
            } else {
                Err(TargetError::Validation {
                    detail: errors.join("; "),
                })
            }
        }
    }
}
