//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `enrich`: Run the enrichment pipeline over a record file
//! - `validate`: Report feature coverage of an enriched file
//! - `config`: Show or initialize the config file

mod config;
mod enrich;
mod validate;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tokio::runtime::Runtime;

pub use config::cmd_config;
pub use enrich::cmd_enrich;
pub use validate::cmd_validate;

/// Track Enricher CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Enrich a CSV, TSV or JSON file of tracks with audio features
    Enrich(EnrichArgs),
    /// Report how many rows of an enriched file carry features
    Validate {
        /// Enriched file to inspect
        file: PathBuf,
        /// Input file the enriched file was produced from; feature columns
        /// it already had are not counted as enriched
        #[arg(long, value_name = "PATH")]
        source: Option<PathBuf>,
        /// Config file (default: OS config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Show the effective configuration, or write the defaults
    Config {
        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
        /// Config file (default: OS config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct EnrichArgs {
    /// Input file (.csv, .tsv or .json)
    pub input: PathBuf,
    /// Output file; its extension picks the format
    pub output: PathBuf,
    /// Config file (default: OS config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Client id (or set TRACK_ENRICHER_CLIENT_ID env var)
    #[arg(long, env = "TRACK_ENRICHER_CLIENT_ID")]
    pub client_id: Option<String>,
    /// Client secret (or set TRACK_ENRICHER_CLIENT_SECRET env var)
    #[arg(long, env = "TRACK_ENRICHER_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
    /// Also fetch per-track analysis aggregates
    #[arg(long)]
    pub analysis: bool,
    /// Maximum number of tracks to analyze
    #[arg(long, value_name = "N")]
    pub max_analysis: Option<usize>,
    /// Identifiers per request (1-100)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..=100))]
    pub batch_size: Option<u64>,
    /// Save progress every N records
    #[arg(long, value_name = "N")]
    pub checkpoint_every: Option<usize>,
    /// Checkpoint file in the output's format (default: the output file)
    #[arg(long, value_name = "PATH")]
    pub checkpoint: Option<PathBuf>,
    /// Ignore and remove any existing checkpoint
    #[arg(long)]
    pub no_resume: bool,
    /// Also write the run report as JSON
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Enrich(args) => {
            let rt = Runtime::new()?;
            cmd_enrich(&rt, args)
        }
        Commands::Validate {
            file,
            source,
            config,
        } => cmd_validate(file, source.as_deref(), config.as_deref()),
        Commands::Config { init, config } => cmd_config(*init, config.as_deref()),
    }
}
