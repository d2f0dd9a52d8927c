//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, OutputFormat};
use crate::config::PipelineConfig;
use crate::engine::{RunSummary, SourceRun, SyncEngine, SyncReport};
use crate::error::{Error, Result};
use crate::validation::{ValidationReport, Validator};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
    cancel: CancellationToken,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop waits and runs when this token is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the CLI command.
    ///
    /// Returns `false` when the command completed but found a problem
    /// (a failed source or a failed validation).
    pub async fn run(&self) -> Result<bool> {
        let config = PipelineConfig::load(&self.cli.config)?;
        let engine = SyncEngine::from_config(&config, self.cancel.clone()).await?;

        match &self.cli.command {
            Commands::Sync { sources } => self.sync(&engine, sources.as_deref()).await,
            Commands::Validate { sample } => self.validate(&engine, *sample).await,
            Commands::Ids { source } => {
                let count = engine.known_ids(source).await?;
                self.emit(&json!({ "source": source, "known_ids": count }));
                Ok(true)
            }
            Commands::Refresh { source } => {
                engine.refresh(source).await?;
                info!(source = %source, "Token refreshed");
                self.emit(&json!({ "source": source, "refreshed": true }));
                Ok(true)
            }
        }
    }

    async fn sync(&self, engine: &SyncEngine, sources: Option<&str>) -> Result<bool> {
        let summary = match sources {
            None => engine.sync_all().await,
            Some(list) => {
                let names: Vec<&str> = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                for name in &names {
                    engine.source(name)?;
                }
                let mut summary = RunSummary::default();
                for name in names {
                    let result = engine.sync(name).await;
                    summary.runs.push(SourceRun {
                        source: name.to_string(),
                        result,
                    });
                }
                summary
            }
        };

        for run in &summary.runs {
            match &run.result {
                Ok(report) => self.emit_report(report),
                Err(e) => self.emit(&json!({ "source": run.source, "error": e.to_string() })),
            }
        }

        if summary
            .runs
            .iter()
            .any(|r| matches!(r.error(), Some(Error::Cancelled)))
        {
            return Err(Error::Cancelled);
        }
        Ok(summary.all_succeeded())
    }

    async fn validate(&self, engine: &SyncEngine, sample: usize) -> Result<bool> {
        let validator = Validator::new().with_sample_size(sample);
        let report = engine.validate(&validator).await?;
        self.emit_validation(&report);
        Ok(report.passed())
    }

    fn emit_report(&self, report: &SyncReport) {
        match self.cli.format {
            OutputFormat::Json => self.emit(report),
            OutputFormat::Pretty => println!(
                "{}: {} fetched, {} new, {} inserted, {} updated, {} failed, {} not found ({} ms)",
                report.source,
                report.fetched,
                report.new_ids,
                report.inserted,
                report.updated,
                report.failed,
                report.not_found,
                report.duration_ms
            ),
        }
    }

    fn emit_validation(&self, report: &ValidationReport) {
        if self.cli.format == OutputFormat::Json {
            self.emit(report);
            return;
        }
        for table in &report.tables {
            match &table.mismatch {
                None => println!("{}: ok ({} keys sampled)", table.table, table.sampled),
                Some(mismatch) => println!("{}: FAILED, {mismatch}", table.table),
            }
        }
    }

    fn emit<T: Serialize>(&self, value: &T) {
        let line = match self.cli.format {
            OutputFormat::Json => serde_json::to_string(value),
            OutputFormat::Pretty => serde_json::to_string_pretty(value),
        };
        println!("{}", line.unwrap_or_default());
    }
}
