//! `veil generate`: encode the selected payload and write the artifact.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use serde::Serialize;
use veil_encode::{EncodeReport, NoneEncoder};
use veil_module::{
    drive, Evasion, EvasionModule, FileFormatEvasion, LocalStore, RunContext, RunOutcome,
    PAYLOAD_KEY,
};
use veil_registry::Catalog;

use super::{print_json, OutputFormat};

/// What a successful generation produced.
#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GenerateSummary {
    pub module: String,
    pub payload: String,
    pub path: Option<PathBuf>,
    pub raw_size: usize,
    pub size: usize,
    pub sha256: String,
    pub report: Option<EncodeReport>,
}

/// Run the module's file-format lifecycle into `out_dir`.
pub fn generate(
    module: EvasionModule,
    catalog: &Catalog,
    payload: Option<&str>,
    out_dir: &Path,
) -> Result<GenerateSummary> {
    let mut evasion = FileFormatEvasion::new(module);
    if let Some(name) = payload {
        evasion.module_mut().set(PAYLOAD_KEY, name);
    }

    let mut store = LocalStore::new(out_dir.to_path_buf());
    let mut ctx = RunContext {
        registry: catalog,
        encoder: &NoneEncoder,
        store: &mut store,
    };
    let outcome = drive(&mut evasion, &mut ctx);

    let module = evasion.into_module();
    let report = module.last_encode_report().cloned();
    match outcome {
        RunOutcome::Ok(artifact) => Ok(GenerateSummary {
            module: module.module_ref().to_string(),
            path: module.file_format_filename().map(|f| out_dir.join(f)),
            raw_size: artifact.raw_size,
            size: artifact.len(),
            sha256: artifact.digest(),
            payload: artifact.payload,
            report,
        }),
        RunOutcome::Failed(failure) => {
            if let Some(report) = &report {
                eprint!("{report}");
            }
            bail!("{} failed: {failure}", module.module_ref())
        }
        RunOutcome::Completed => bail!("{} completed without an artifact", module.module_ref()),
    }
}

pub fn run(
    module: EvasionModule,
    catalog: &Catalog,
    payload: Option<&str>,
    out_dir: &Path,
    format: OutputFormat,
) -> Result<()> {
    let summary = generate(module, catalog, payload, out_dir)?;
    if format == OutputFormat::Json {
        return print_json(&summary);
    }

    println!("Generated {} for {}", summary.payload, summary.module);
    if let Some(path) = &summary.path {
        println!("  File:    {}", path.display());
    }
    println!("  Size:    {} bytes ({} raw)", summary.size, summary.raw_size);
    println!("  SHA-256: {}", summary.sha256);
    if let Some(report) = &summary.report {
        println!();
        print!("{report}");
    }
    Ok(())
}
