//! Validation report types

use crate::types::FieldValue;
use serde::Serialize;
use std::fmt;

/// One field compared for a sampled key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSample {
    /// Primary key value of the sampled row
    pub key: String,
    /// Field that was compared
    pub field: String,
    /// Value in the staged snapshot
    pub staged: FieldValue,
    /// Value in the database (null when the row is missing)
    pub persisted: FieldValue,
}

/// A finding reported for a table
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mismatch {
    /// Staged and persisted row counts differ; fields were not sampled
    Dimension { staged: usize, persisted: usize },
    /// First differing field of a sampled row
    Field(ValidationSample),
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dimension { staged, persisted } => write!(
                f,
                "dimension mismatch: staged count {staged}, persisted count {persisted}"
            ),
            Self::Field(s) => write!(
                f,
                "key {}: field '{}' staged '{}' ({}) persisted '{}' ({})",
                s.key,
                s.field,
                s.staged,
                s.staged.type_name(),
                s.persisted,
                s.persisted.type_name()
            ),
        }
    }
}

/// Result for one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableReport {
    pub table: String,
    /// Columns used to match rows
    pub key_columns: Vec<String>,
    pub staged_rows: usize,
    pub persisted_rows: usize,
    /// Number of keys sampled
    pub sampled: usize,
    /// `None` when the table passed
    pub mismatch: Option<Mismatch>,
}

impl TableReport {
    pub fn passed(&self) -> bool {
        self.mismatch.is_none()
    }
}

/// Result of a validation run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub tables: Vec<TableReport>,
}

impl ValidationReport {
    /// Whether every table passed
    pub fn passed(&self) -> bool {
        self.tables.iter().all(TableReport::passed)
    }

    /// All findings, in table order
    pub fn mismatches(&self) -> Vec<&Mismatch> {
        self.tables.iter().filter_map(|t| t.mismatch.as_ref()).collect()
    }

    /// Names of the tables that failed
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| !t.passed())
            .map(|t| t.table.as_str())
            .collect()
    }

    /// Report of one table
    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|t| t.table == name)
    }
}
