//! Loading a configured module from files and command-line overrides.

use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::debug;
use veil_core::{load_datastore_toml, OptValue};
use veil_module::{load_module_toml, EvasionModule};
use veil_registry::{load_catalog_toml, Catalog};
use veil_targets::load_targets_toml;

/// Split a `KEY=VALUE` override.
pub fn parse_override(raw: &str) -> Result<(String, OptValue)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), OptValue::parse_loose(value)))
        }
        _ => bail!("invalid override '{raw}': expected KEY=VALUE"),
    }
}

/// Build a module from its definition, then apply the preset datastore
/// and the `--set` overrides, in that order.
///
/// A `targets` document replaces the definition's inline targets and
/// default index before the module is built.
pub fn load_module(
    definition: &Path,
    targets: Option<&Path>,
    preset: Option<&Path>,
    overrides: &[String],
) -> Result<EvasionModule> {
    let mut info = load_module_toml(definition)
        .with_context(|| format!("loading module {}", definition.display()))?;
    if let Some(targets) = targets {
        let doc = load_targets_toml(targets)
            .with_context(|| format!("loading targets {}", targets.display()))?;
        debug!(targets = %targets.display(), count = doc.targets.len(), "replacing module targets");
        info.replace_targets(doc);
    }
    let mut module = EvasionModule::new(info)
        .with_context(|| format!("building module {}", definition.display()))?;

    if let Some(preset) = preset {
        let values = load_datastore_toml(preset)
            .with_context(|| format!("loading preset {}", preset.display()))?;
        debug!(preset = %preset.display(), values = values.len(), "applying preset");
        module.datastore_mut().merge(&values);
    }
    for raw in overrides {
        let (key, value) = parse_override(raw)?;
        debug!(key = %key, value = %value, "datastore override");
        module.set(&key, value);
    }
    Ok(module)
}

pub fn load_catalog(path: &Path) -> Result<Catalog> {
    load_catalog_toml(path).with_context(|| format!("loading catalog {}", path.display()))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::{Path, PathBuf};

    pub const MODULE: &str = r#"
name = "Windows Defender Evasive Executable"
refname = "windows/windows_defender_exe"
platform = ["windows"]
arch = ["x86"]

[payload]
space = 64
bad-chars = "00"

[[target]]
name = "Microsoft Windows"

[[target]]
name = "Windows x64"
arch = ["x64"]
"#;

    pub const CATALOG: &str = r#"
[[payload]]
ref-name = "windows/exec"
supported-platforms = ["windows"]
supported-archs = ["x86"]
bytes = "fce8"

[[payload]]
ref-name = "windows/x64/exec"
supported-platforms = ["windows"]
supported-archs = ["x64"]
bytes = "4883"

[[payload]]
ref-name = "linux/x86/exec"
supported-platforms = ["linux"]
supported-archs = ["x86"]
bytes = "31c0"
"#;

    pub fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use veil_core::ConfigurationView;

    #[test]
    fn override_parsing() {
        let (key, value) = parse_override("TARGET=1").unwrap();
        assert_eq!(key, "TARGET");
        assert_eq!(value, OptValue::Int(1));

        let (_, value) = parse_override("FILENAME=a=b.exe").unwrap();
        assert_eq!(value, OptValue::Str("a=b.exe".into()));

        assert!(parse_override("TARGET").is_err());
        assert!(parse_override("=1").is_err());
    }

    #[test]
    fn overrides_win_over_preset() {
        let dir = tempfile::tempdir().unwrap();
        let module_path = write(dir.path(), "module.toml", MODULE);
        let preset = write(dir.path(), "preset.toml", "TARGET = 1\nFILENAME = \"p.exe\"\n");

        let module = load_module(
            &module_path,
            None,
            Some(&preset),
            &["FILENAME=cli.exe".to_string()],
        )
        .unwrap();
        assert_eq!(module.datastore().get_int("TARGET"), Some(1));
        assert_eq!(module.file_format_filename().as_deref(), Some("cli.exe"));
        assert_eq!(module.target().unwrap().name, "Windows x64");
    }

    #[test]
    fn missing_definition_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_module(&dir.path().join("nope.toml"), None, None, &[]).unwrap_err();
        assert!(format!("{err:#}").starts_with("loading module"));
    }

    #[test]
    fn targets_document_replaces_inline_targets() {
        let dir = tempfile::tempdir().unwrap();
        let module_path = write(dir.path(), "module.toml", MODULE);
        let targets = write(
            dir.path(),
            "targets.toml",
            r#"
default-target = 2

[[target]]
name = "Windows 7"

[[target]]
name = "Windows 10"

[[target]]
name = "Server 2019"
arch = ["x64"]
"#,
        );

        let module = load_module(&module_path, Some(&targets), None, &[]).unwrap();
        assert_eq!(module.targets().len(), 3);
        assert_eq!(module.target().unwrap().name, "Server 2019");

        let module = load_module(&module_path, Some(&targets), None, &["TARGET=Windows 7".to_string()]).unwrap();
        assert_eq!(module.target_index(), Some(0));
    }

    #[test]
    fn invalid_targets_document_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let module_path = write(dir.path(), "module.toml", MODULE);
        let targets = write(dir.path(), "targets.toml", "default-target = 5\n\n[[target]]\nname = \"Only\"\n");
        assert!(load_module(&module_path, Some(&targets), None, &[]).is_err());

        let err = load_module(&module_path, Some(&dir.path().join("none.toml")), None, &[]).unwrap_err();
        assert!(format!("{err:#}").starts_with("loading targets"));
    }

    #[test]
    fn catalog_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "catalog.toml", CATALOG);
        assert_eq!(load_catalog(&path).unwrap().len(), 3);
    }
}
