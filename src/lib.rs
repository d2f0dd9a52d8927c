// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # pulse-etl
//!
//! Incremental sync of rate-limited, token-authenticated APIs into DuckDB,
//! with post-load verification.
//!
//! ## Features
//!
//! - **Paginated fetching**: page-number and `nextPageToken` endpoints, the
//!   same page re-requested after every recoverable failure
//! - **Token refresh**: OAuth2 refresh-token flow, single-flight per source,
//!   new tokens written back to the env file
//! - **Change detection**: a durable identifier set per source, so details
//!   are fetched only for records never synced before
//! - **Merge-upsert**: `INSERT ... ON CONFLICT DO UPDATE`, one statement per
//!   record, composite keys supported
//! - **Validation**: row counts plus field-level sampling of staged against
//!   persisted data
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pulse_etl::config::PipelineConfig;
//! use pulse_etl::engine::SyncEngine;
//! use pulse_etl::validation::Validator;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> pulse_etl::Result<()> {
//!     let config = PipelineConfig::load("pipeline.yaml")?;
//!     let engine = SyncEngine::from_config(&config, CancellationToken::new()).await?;
//!
//!     let summary = engine.sync_all().await;
//!     for report in summary.reports() {
//!         println!("{}: {} inserted", report.source, report.inserted);
//!     }
//!
//!     let report = engine.validate(&Validator::new()).await?;
//!     assert!(report.passed());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SyncEngine                               │
//! │  fetch_all → resolve → fetch_details → upsert → add_ids → stage  │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌──────────┬────────────┬───────┴──────┬────────────┬─────────────┐
//! │   Auth   │    HTTP    │   Paginate   │   Cache    │  Database   │
//! ├──────────┼────────────┼──────────────┼────────────┼─────────────┤
//! │ Refresh  │ Rate Limit │ Page Number  │ Id Sets    │ DuckDB      │
//! │ Env File │ 429 / 401  │ Cursor       │ Resolver   │ Upsert      │
//! │          │ Retry      │ Details      │            │ Validation  │
//! └──────────┴────────────┴──────────────┴────────────┴─────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types for the pipeline
pub mod error;

/// Common types and type aliases
pub mod types;

/// Table schemas and JSON-to-record mapping
pub mod schema;

/// Credential state and token refresh
pub mod auth;

/// HTTP client, error policy and retry policy
pub mod http;

/// Pagination strategies and the paginated fetcher
pub mod pagination;

/// Named endpoint definitions
pub mod endpoint;

/// Identifier cache and change-set resolution
pub mod cache;

/// DuckDB relational store
pub mod database;

/// Staged snapshot storage
pub mod staging;

/// Post-load validation
pub mod validation;

/// Main execution engine
pub mod engine;

/// Pipeline configuration
pub mod config;

/// Template interpolation
pub mod template;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

// Re-export commonly used types
pub use config::PipelineConfig;
pub use engine::SyncEngine;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
