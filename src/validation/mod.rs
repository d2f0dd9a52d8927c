//! Validation module
//!
//! Post-load verification of persisted tables against staged snapshots.
//!
//! # Overview
//!
//! For each staged table:
//! - Compare row counts; a mismatch skips field sampling for that table
//! - Sample up to ten distinct primary keys (`(date, hour)` when present)
//! - Compare every field of the sampled rows, stopping at the first mismatch
//!
//! Timestamps and dates are normalised identically on both sides first.
//! Mismatches are findings in the returned report, never errors.

mod normalize;
mod types;
mod validator;

pub use normalize::{normalize_pair, normalize_value, TemporalKind};
pub use types::{Mismatch, TableReport, ValidationReport, ValidationSample};
pub use validator::{values_match, Validator, DEFAULT_SAMPLE_SIZE};
