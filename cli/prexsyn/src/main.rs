//! PrexSyn CLI: inspect and verify `.pxs` caches, check pipeline configs.

mod commands;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prexsyn", version, about = "PrexSyn chemical-space tools")]
struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a .pxs cache file
    Inspect {
        /// Cache file
        file: PathBuf,
        /// Entries to list for list-like payloads
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Print the header as JSON instead of decoding the payload
        #[arg(long)]
        json: bool,
    },
    /// Check the integrity trailer and header of a .pxs cache file
    Verify {
        /// Cache file
        file: PathBuf,
    },
    /// Parse and validate a pipeline TOML config
    CheckConfig {
        /// Config file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let report = match cli.command {
        Commands::Inspect { file, limit, json } => commands::inspect::run(&file, limit, json)?,
        Commands::Verify { file } => commands::verify::run(&file)?,
        Commands::CheckConfig { file } => commands::check_config::run(&file)?,
    };
    print!("{report}");
    Ok(())
}
