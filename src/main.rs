//! Track Enricher - adds audio features from a remote metadata service to
//! tabular track datasets.
//!
//! Runs are batched, rate-limit aware and resumable: progress is
//! checkpointed so an interrupted run picks up where it stopped.

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod enrichment;
pub mod error;
pub mod pipeline;
#[cfg(test)]
pub mod test_utils;
pub mod validate;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Log targets enabled at `info` unless `RUST_LOG` says otherwise
const DEFAULT_DIRECTIVES: &[&str] = &[
    "track_enricher=info",
    "pipeline=info",
    "fetcher=info",
    "auth=info",
    "checkpoint=info",
];

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    cli::run_command(&args)
}
