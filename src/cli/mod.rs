//! Command-line interface for track-enricher.
//!
//! This module provides the `enrich`, `validate` and `config` commands.

mod commands;

pub use commands::{Cli, Commands, run_command};
