//! Post-load validator
//!
//! Compares a staged snapshot with the rows the database holds: first by
//! row count, then field by field on a random sample of primary keys.

use super::normalize::normalize_pair;
use super::types::{Mismatch, TableReport, ValidationReport, ValidationSample};
use crate::types::{key_repr, FieldValue, Record, Table};
use rand::seq::IndexedRandom;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use tracing::{error, info};

/// Number of keys sampled per table
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Staged-versus-persisted comparison
#[derive(Debug, Clone)]
pub struct Validator {
    sample_size: usize,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Validator {
    pub fn new() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    /// Sample at most `size` keys per table (at least one)
    #[must_use]
    pub fn with_sample_size(mut self, size: usize) -> Self {
        self.sample_size = size.max(1);
        self
    }

    /// Columns used to match rows.
    ///
    /// `(date, hour)` when the table has both, otherwise the declared
    /// primary key, otherwise the first column.
    pub fn key_columns(table: &Table) -> Vec<String> {
        if table.has_column("date") && table.has_column("hour") {
            return vec!["date".to_string(), "hour".to_string()];
        }
        if !table.primary_key.is_empty() {
            return table.primary_key.clone();
        }
        table.columns.iter().take(1).cloned().collect()
    }

    /// Validate every staged table against the persisted table of the same
    /// name. A persisted table that is absent counts as empty.
    pub fn validate<R: Rng + ?Sized>(
        &self,
        staged: &[Table],
        persisted: &[Table],
        rng: &mut R,
    ) -> ValidationReport {
        let tables = staged
            .iter()
            .map(|staged_table| {
                let empty;
                let persisted_table = match persisted.iter().find(|t| t.name == staged_table.name) {
                    Some(t) => t,
                    None => {
                        empty = Table::new(
                            staged_table.name.clone(),
                            staged_table.columns.clone(),
                            staged_table.primary_key.clone(),
                        );
                        &empty
                    }
                };
                self.validate_table(staged_table, persisted_table, rng)
            })
            .collect();

        ValidationReport { tables }
    }

    /// Validate one table pair
    pub fn validate_table<R: Rng + ?Sized>(
        &self,
        staged: &Table,
        persisted: &Table,
        rng: &mut R,
    ) -> TableReport {
        let key_columns = Self::key_columns(staged);
        let mut report = TableReport {
            table: staged.name.clone(),
            key_columns: key_columns.clone(),
            staged_rows: staged.len(),
            persisted_rows: persisted.len(),
            sampled: 0,
            mismatch: None,
        };

        if staged.len() != persisted.len() {
            error!(
                table = %staged.name,
                "Dimension mismatch: staged count {}, persisted count {}",
                staged.len(),
                persisted.len()
            );
            report.mismatch = Some(Mismatch::Dimension {
                staged: staged.len(),
                persisted: persisted.len(),
            });
            return report;
        }

        let (staged, persisted) = normalize_pair(staged, persisted);
        let staged_rows = index_rows(&staged, &key_columns);
        let persisted_rows = index_rows(&persisted, &key_columns);

        let keys = self.sample_keys(&staged, &key_columns, rng);
        report.sampled = keys.len();

        for key in keys {
            let Some(staged_row) = staged_rows.get(&key) else {
                continue;
            };
            let persisted_row = persisted_rows.get(&key);

            for field in &staged.columns {
                let staged_value = staged_row.get(field).cloned().unwrap_or_default();
                let persisted_value = persisted_row
                    .and_then(|row| row.get(field))
                    .cloned()
                    .unwrap_or_default();

                if !values_match(&staged_value, &persisted_value) {
                    let mismatch = Mismatch::Field(ValidationSample {
                        key: display_key(staged_row, &key_columns),
                        field: field.clone(),
                        staged: staged_value,
                        persisted: persisted_value,
                    });
                    error!(table = %staged.name, "Mismatch found: {mismatch}");
                    report.mismatch = Some(mismatch);
                    return report;
                }
            }
        }

        info!(
            table = %staged.name,
            sampled = report.sampled,
            "Post-load checks passed"
        );
        report
    }

    /// Distinct staged keys, all of them or a random sample
    fn sample_keys<R: Rng + ?Sized>(
        &self,
        table: &Table,
        key_columns: &[String],
        rng: &mut R,
    ) -> Vec<String> {
        let mut seen = HashSet::new();
        let distinct: Vec<String> = table
            .rows
            .iter()
            .map(|row| key_repr(&Table::key_of(row, key_columns)))
            .filter(|key| seen.insert(key.clone()))
            .collect();

        if distinct.len() <= self.sample_size {
            return distinct;
        }
        distinct
            .choose_multiple(rng, self.sample_size)
            .cloned()
            .collect()
    }
}

/// First row per key
fn index_rows<'a>(table: &'a Table, key_columns: &[String]) -> HashMap<String, &'a Record> {
    let mut index = HashMap::new();
    for row in &table.rows {
        index
            .entry(key_repr(&Table::key_of(row, key_columns)))
            .or_insert(row);
    }
    index
}

fn display_key(row: &Record, key_columns: &[String]) -> String {
    Table::key_of(row, key_columns)
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Whether a staged value and a persisted value agree.
///
/// Nulls (and NaN) on both sides agree. A staged float agrees with a
/// persisted decimal when it renders to the same digits at the decimal's
/// scale. Otherwise type and value must both be equal.
pub fn values_match(staged: &FieldValue, persisted: &FieldValue) -> bool {
    match (staged, persisted) {
        (s, p) if s.is_null() && p.is_null() => true,
        (FieldValue::Float(f), FieldValue::Decimal(d)) => {
            let scale = decimal_scale(d);
            canonical_decimal(&format!("{f:.scale$}")) == canonical_decimal(d)
        }
        (FieldValue::Decimal(a), FieldValue::Decimal(b)) => {
            canonical_decimal(a) == canonical_decimal(b)
        }
        (s, p) => s == p,
    }
}

fn decimal_scale(text: &str) -> usize {
    text.split_once('.').map_or(0, |(_, frac)| frac.len())
}

/// Decimal text without redundant zeros, so `20.0` and `20.00` compare equal
fn canonical_decimal(text: &str) -> String {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    let int_part = int_part.trim_start_matches('0');
    let frac_part = frac_part.trim_end_matches('0');

    let int_part = if int_part.is_empty() { "0" } else { int_part };
    let magnitude = if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{int_part}.{frac_part}")
    };

    if negative && magnitude != "0" {
        format!("-{magnitude}")
    } else {
        magnitude
    }
}
