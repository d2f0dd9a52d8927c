//! CLI module
//!
//! Command-line interface for running pipelines.
//!
//! # Commands
//!
//! - `sync` - Sync all (or selected) sources
//! - `validate` - Compare staged snapshots with the database
//! - `ids` - Count cached identifiers of a source
//! - `refresh` - Force a token refresh

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat};
pub use runner::Runner;
