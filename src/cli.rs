//! CLI argument parsing for the enrichment pipeline.
//!
//! The CLI stays thin: it loads and validates a config document, builds
//! the pipeline, and runs it. Policy lives in the config file, not in
//! flags.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "lmetl",
    version,
    about = "LM-driven record enrichment pipeline",
    after_help = "Commands:\n  init --config <path>           Write a worked example config\n  run --config <path>            Run the configured pipeline\n  run --config <path> --dry-run  Validate configuration without touching data\n\nExamples:\n  lmetl init --config pipeline.json\n  lmetl run --config pipeline.json --dry-run\n  lmetl run --config pipeline.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    Init(InitArgs),
    Run(RunArgs),
}

/// Init command inputs for bootstrapping a config.
#[derive(Parser, Debug)]
#[command(about = "Write a worked example pipeline config")]
pub struct InitArgs {
    /// Destination path for the config document
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Overwrite an existing config
    #[arg(long)]
    pub force: bool,
}

/// Run command inputs.
#[derive(Parser, Debug)]
#[command(about = "Run the configured enrichment pipeline")]
pub struct RunArgs {
    /// Path to the pipeline config document
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,

    /// Validate configuration and exit without processing any rows
    #[arg(long)]
    pub dry_run: bool,
}
