//! `veil targets`: list a module's targets and the active one.

use anyhow::Result;
use serde::Serialize;
use veil_module::EvasionModule;
use veil_targets::Target;

use super::{join_or_dash, print_json, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetRow<'a> {
    pub index: usize,
    pub active: bool,
    #[serde(flatten)]
    pub target: &'a Target,
}

pub fn rows(module: &EvasionModule) -> Vec<TargetRow<'_>> {
    let active = module.target_index();
    module
        .targets()
        .iter()
        .enumerate()
        .map(|(index, target)| TargetRow {
            index,
            active: active == Some(index),
            target,
        })
        .collect()
}

pub fn run(module: &EvasionModule, format: OutputFormat) -> Result<()> {
    let rows = rows(module);
    if format == OutputFormat::Json {
        return print_json(&rows);
    }

    println!("=== Targets: {} ===", module.module_ref());
    if rows.is_empty() {
        println!("  (no targets declared)");
        return Ok(());
    }
    for row in &rows {
        let marker = if row.active { "=>" } else { "  " };
        let platform = if row.target.platform.is_empty() {
            module.info().platform.to_string()
        } else {
            row.target.platform.to_string()
        };
        let arch = join_or_dash(row.target.arch.iter().map(|a| a.as_str()));
        println!(
            "{marker} {:>2}  {:<30} {:<20} {arch}",
            row.index, row.target.name, platform
        );
    }

    let (platform, arch) = module.normalize_platform_arch();
    println!();
    println!(
        "Effective: {} / {}",
        join_or_dash(platform.names()),
        join_or_dash(arch.iter().map(|a| a.as_str()))
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_module::parse_module_toml;

    use crate::session::fixtures::MODULE;

    fn module() -> EvasionModule {
        EvasionModule::new(parse_module_toml(MODULE).unwrap()).unwrap()
    }

    #[test]
    fn default_target_is_active() {
        let m = module();
        let rows = rows(&m);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].active);
        assert!(!rows[1].active);
    }

    #[test]
    fn datastore_target_moves_marker() {
        let mut m = module();
        m.set("TARGET", "Windows x64");
        let rows = rows(&m);
        assert!(rows[1].active);
    }

    #[test]
    fn json_rows_flatten_target() {
        let m = module();
        let value = serde_json::to_value(rows(&m)).unwrap();
        assert_eq!(value[1]["name"], "Windows x64");
        assert_eq!(value[1]["arch"][0], "x64");
        assert_eq!(value[0]["active"], true);
    }

    #[test]
    fn run_prints_both_formats() {
        let m = module();
        run(&m, OutputFormat::Text).unwrap();
        run(&m, OutputFormat::Json).unwrap();
    }
}
