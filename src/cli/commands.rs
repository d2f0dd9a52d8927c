//! CLI commands and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Incremental API-to-DuckDB sync
#[derive(Parser, Debug)]
#[command(name = "pulse-etl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline definition file (YAML)
    #[arg(short, long, global = true, default_value = "pipeline.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, global = true, default_value = "pretty")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync sources into the database
    Sync {
        /// Sources to sync (comma-separated, empty = all)
        #[arg(long)]
        sources: Option<String>,
    },

    /// Compare staged snapshots with the database
    Validate {
        /// Keys sampled per table
        #[arg(long, default_value = "10")]
        sample: usize,
    },

    /// Show how many identifiers are cached for a source
    Ids {
        /// Source name
        source: String,
    },

    /// Force a token refresh for a source and persist it
    Refresh {
        /// Source name
        source: String,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one line per report)
    Json,
    /// Human-readable output
    Pretty,
}
