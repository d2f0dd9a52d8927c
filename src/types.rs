//! Common types used throughout pulse-etl
//!
//! This module contains the record model shared by the fetch, persist and
//! validate stages: scalar field values, records, tables of records and
//! record identifiers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// A record: field name to scalar value
pub type Record = BTreeMap<String, FieldValue>;

// ============================================================================
// Record Identifiers
// ============================================================================

/// Identifier of an upstream record, as used by the identifier cache.
///
/// Integers and strings never compare equal to each other, so `42` and
/// `"42"` are distinct identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric identifier
    Int(i64),
    /// String identifier
    Text(String),
}

impl RecordId {
    /// Extract an identifier from a JSON scalar
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Number(n) => n.as_i64().map(Self::Int),
            JsonValue::String(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// Extract an identifier from a record field value
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Integer(i) => Some(Self::Int(*i)),
            FieldValue::Text(s) if !s.is_empty() => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// ============================================================================
// Field Values
// ============================================================================

/// A scalar value in a record.
///
/// The set is closed so that comparisons in the validator are exhaustive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    /// Fixed-point value kept in its canonical decimal text form
    Decimal(String),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl FieldValue {
    /// Null, or a floating point NaN
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Name of the value's type, used in mismatch reports
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::Date(_) => "date",
        }
    }

    /// Stable textual form, used to deduplicate key values
    pub fn key_string(&self) -> String {
        format!("{}:{self}", self.type_name())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Decimal(d) => f.write_str(d),
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S%.fZ")),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

// ============================================================================
// Tables
// ============================================================================

/// An ordered batch of records of one record type.
///
/// Used both for what a sync run stages and for what is read back from the
/// relational store.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Column names in declaration order
    pub columns: Vec<String>,
    /// Primary key columns
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Rows
    #[serde(default)]
    pub rows: Vec<Record>,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<String>, columns: Vec<String>, primary_key: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
            rows: Vec::new(),
        }
    }

    /// Set the rows
    #[must_use]
    pub fn with_rows(mut self, rows: Vec<Record>) -> Self {
        self.rows = rows;
        self
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the table declares a column
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    /// Values of the given key columns for a row (missing fields are null)
    pub fn key_of(row: &Record, key_columns: &[String]) -> Vec<FieldValue> {
        key_columns
            .iter()
            .map(|c| row.get(c).cloned().unwrap_or_default())
            .collect()
    }

    /// Merge rows into this table by primary key.
    ///
    /// Rows whose key already exists replace the existing row in place,
    /// other rows are appended. Returns the number of appended rows.
    pub fn merge_rows(&mut self, rows: Vec<Record>) -> usize {
        let key_columns = self.primary_key.clone();
        let mut index: HashMap<String, usize> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (key_repr(&Self::key_of(row, &key_columns)), i))
            .collect();

        let mut appended = 0;
        for row in rows {
            let key = key_repr(&Self::key_of(&row, &key_columns));
            if let Some(&i) = index.get(&key) {
                self.rows[i] = row;
            } else {
                index.insert(key, self.rows.len());
                self.rows.push(row);
                appended += 1;
            }
        }
        appended
    }
}

/// Textual form of a (possibly composite) key
pub fn key_repr(values: &[FieldValue]) -> String {
    values
        .iter()
        .map(FieldValue::key_string)
        .collect::<Vec<_>>()
        .join("|")
}

// ============================================================================
// Backoff Type
// ============================================================================

/// Type of backoff for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
