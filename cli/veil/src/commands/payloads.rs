//! `veil payloads`: payloads deliverable to a module's active target.

use anyhow::Result;
use serde::Serialize;
use veil_module::EvasionModule;
use veil_registry::Catalog;
use veil_targets::{Arch, Platform};

use super::{join_or_dash, print_json, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PayloadRow {
    pub name: String,
    pub platforms: Vec<String>,
    pub archs: Vec<String>,
    pub privileged: bool,
    pub size: Option<u64>,
}

/// Compatible payloads in catalog order, minus the excluded platforms and
/// architectures.
pub fn rows(
    module: &EvasionModule,
    catalog: &Catalog,
    exclude_platforms: &[String],
    exclude_archs: &[String],
) -> Result<Vec<PayloadRow>> {
    let platforms: Vec<Platform> = exclude_platforms.iter().map(|p| Platform::from(p.as_str())).collect();
    let archs: Vec<Arch> = exclude_archs.iter().map(|a| Arch::from(a.as_str())).collect();

    let compatible = module.compatible_payloads(catalog, catalog, &platforms, &archs)?;
    let rows = compatible
        .into_iter()
        .map(|c| {
            let descriptor = catalog.entry(&c.name).map(|e| e.descriptor());
            PayloadRow {
                platforms: descriptor
                    .as_ref()
                    .map(|d| d.supported_platforms.names())
                    .unwrap_or_default(),
                archs: descriptor
                    .as_ref()
                    .map(|d| d.supported_archs.iter().map(|a| a.as_str().to_string()).collect())
                    .unwrap_or_default(),
                privileged: descriptor.as_ref().is_some_and(|d| d.privileged),
                size: descriptor.and_then(|d| d.size),
                name: c.name,
            }
        })
        .collect();
    Ok(rows)
}

pub fn run(
    module: &EvasionModule,
    catalog: &Catalog,
    exclude_platforms: &[String],
    exclude_archs: &[String],
    format: OutputFormat,
) -> Result<()> {
    let rows = rows(module, catalog, exclude_platforms, exclude_archs)?;
    if format == OutputFormat::Json {
        return print_json(&rows);
    }

    let target = module
        .target()
        .map(|t| t.name.as_str())
        .unwrap_or("(none)");
    println!("=== Compatible payloads: {} ===", module.module_ref());
    println!("Target: {target}");
    println!();
    if rows.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for row in &rows {
        let size = row
            .size
            .map(|s| format!("{s} bytes"))
            .unwrap_or_else(|| "-".to_string());
        let privileged = if row.privileged { " [privileged]" } else { "" };
        println!(
            "  {:<40} {:<20} {:<10} {size}{privileged}",
            row.name,
            join_or_dash(&row.platforms),
            join_or_dash(&row.archs)
        );
    }
    println!();
    println!("{} payload(s)", rows.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_module::parse_module_toml;
    use veil_registry::parse_catalog_toml;

    use crate::session::fixtures::{CATALOG, MODULE};

    fn module() -> EvasionModule {
        EvasionModule::new(parse_module_toml(MODULE).unwrap()).unwrap()
    }

    fn names(rows: &[PayloadRow]) -> Vec<&str> {
        rows.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn lists_payloads_for_active_target() {
        let catalog = parse_catalog_toml(CATALOG).unwrap();
        let rows = rows(&module(), &catalog, &[], &[]).unwrap();
        assert_eq!(names(&rows), vec!["windows/exec"]);
        assert_eq!(rows[0].size, Some(2));
        assert_eq!(rows[0].archs, vec!["x86"]);
    }

    #[test]
    fn follows_target_selection() {
        let catalog = parse_catalog_toml(CATALOG).unwrap();
        let mut m = module();
        m.set("TARGET", 1i64);
        let rows = rows(&m, &catalog, &[], &[]).unwrap();
        assert_eq!(names(&rows), vec!["windows/x64/exec"]);
    }

    #[test]
    fn exclusions_apply() {
        let catalog = parse_catalog_toml(CATALOG).unwrap();
        let m = module();
        assert!(rows(&m, &catalog, &["windows".to_string()], &[]).unwrap().is_empty());
        assert!(rows(&m, &catalog, &[], &["x86".to_string()]).unwrap().is_empty());
    }

    #[test]
    fn run_prints_both_formats() {
        let catalog = parse_catalog_toml(CATALOG).unwrap();
        let m = module();
        run(&m, &catalog, &[], &[], OutputFormat::Text).unwrap();
        run(&m, &catalog, &[], &[], OutputFormat::Json).unwrap();
    }
}
