//! Engine types
//!
//! Per-source reports and the summary of a multi-source run.

use crate::error::{Error, Result};
use serde::Serialize;

/// Statistics from one sync run of one source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Source name
    pub source: String,
    /// Target table
    pub table: String,
    /// Identifiers returned by the list endpoint
    pub fetched: usize,
    /// Identifiers not yet in the cache
    pub new_ids: usize,
    /// Records gone upstream before their detail could be fetched
    pub not_found: usize,
    /// Items that could not be mapped onto the table schema
    pub unmapped: usize,
    /// Rows inserted
    pub inserted: usize,
    /// Rows overwritten
    pub updated: usize,
    /// Records the database rejected
    pub failed: usize,
    /// Identifiers newly added to the cache
    pub cached: usize,
    /// Rows in the staged snapshot after this run
    pub staged_rows: usize,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncReport {
    /// Create an empty report
    pub fn new(source: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            table: table.into(),
            ..Self::default()
        }
    }

    /// Rows written (inserted or overwritten)
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }
}

/// Outcome of one source in a multi-source run
#[derive(Debug)]
pub struct SourceRun {
    pub source: String,
    pub result: Result<SyncReport>,
}

impl SourceRun {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Error of a failed run
    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }
}

/// Outcome of all sources in a run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub runs: Vec<SourceRun>,
}

impl RunSummary {
    /// Whether every source completed
    pub fn all_succeeded(&self) -> bool {
        self.runs.iter().all(SourceRun::is_success)
    }

    /// Reports of the sources that completed
    pub fn reports(&self) -> Vec<&SyncReport> {
        self.runs
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .collect()
    }

    /// Names of the sources that failed
    pub fn failed_sources(&self) -> Vec<&str> {
        self.runs
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| r.source.as_str())
            .collect()
    }

    /// Run of one source
    pub fn run(&self, source: &str) -> Option<&SourceRun> {
        self.runs.iter().find(|r| r.source == source)
    }
}
