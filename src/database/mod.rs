//! Relational store via DuckDB
//!
//! Tables are created from their `TableSchema` and written with
//! merge-upsert semantics: new primary keys are inserted, existing ones
//! are overwritten field for field, nothing is ever deleted.

mod engine;
mod types;

pub use engine::DatabaseEngine;
pub use types::UpsertResult;
