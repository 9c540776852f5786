mod commands;
mod logging;
mod session;

use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};

use commands::OutputFormat;

#[derive(Parser)]
#[command(
    name = "veil",
    version,
    about = "Evasion module driver: targets, payload compatibility, encoded artifacts"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Where the module comes from and how it is configured.
#[derive(Args)]
struct ModuleArgs {
    /// Module definition (.toml)
    #[arg(long)]
    module: PathBuf,
    /// Target list replacing the module's inline targets (.toml)
    #[arg(long)]
    targets: Option<PathBuf>,
    /// Datastore preset applied before --set overrides (.toml)
    #[arg(long)]
    preset: Option<PathBuf>,
    /// Datastore override, repeatable (e.g. --set TARGET=1)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

impl ModuleArgs {
    fn load(&self) -> anyhow::Result<veil_module::EvasionModule> {
        session::load_module(
            &self.module,
            self.targets.as_deref(),
            self.preset.as_deref(),
            &self.set,
        )
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the module's targets and show which one is active
    Targets {
        #[command(flatten)]
        module: ModuleArgs,
    },
    /// List catalog payloads compatible with the active target
    Payloads {
        #[command(flatten)]
        module: ModuleArgs,
        /// Payload catalog (.toml)
        #[arg(long)]
        catalog: PathBuf,
        /// Exclude payloads supporting this platform (repeatable)
        #[arg(long = "exclude-platform")]
        exclude_platform: Vec<String>,
        /// Exclude payloads supporting this architecture (repeatable)
        #[arg(long = "exclude-arch")]
        exclude_arch: Vec<String>,
    },
    /// Encode a payload and write the artifact to FILENAME
    Generate {
        #[command(flatten)]
        module: ModuleArgs,
        /// Payload catalog (.toml)
        #[arg(long)]
        catalog: PathBuf,
        /// Payload reference name (overrides PAYLOAD)
        #[arg(long)]
        payload: Option<String>,
        /// Directory the artifact is written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Targets { module } => {
            let evasion = module.load()?;
            commands::targets::run(&evasion, module.format)
        }

        Commands::Payloads {
            module,
            catalog,
            exclude_platform,
            exclude_arch,
        } => {
            let evasion = module.load()?;
            let catalog = session::load_catalog(&catalog)?;
            commands::payloads::run(
                &evasion,
                &catalog,
                &exclude_platform,
                &exclude_arch,
                module.format,
            )
        }

        Commands::Generate {
            module,
            catalog,
            payload,
            out_dir,
        } => {
            let evasion = module.load()?;
            let catalog = session::load_catalog(&catalog)?;
            commands::generate::run(
                evasion,
                &catalog,
                payload.as_deref(),
                &out_dir,
                module.format,
            )
        }
    }
}
