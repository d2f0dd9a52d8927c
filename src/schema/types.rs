//! Schema types

use super::mapping::{coerce, lookup_path};
use crate::error::{Error, Result};
use crate::types::{JsonValue, Record, Table};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    Float,
    /// Fixed-point number
    Decimal {
        #[serde(default = "default_precision")]
        precision: u8,
        #[serde(default = "default_scale")]
        scale: u8,
    },
    Text,
    /// Instant in UTC
    Timestamp,
    Date,
}

fn default_precision() -> u8 {
    18
}

fn default_scale() -> u8 {
    2
}

impl FieldType {
    /// SQL type used for this column in the relational store
    pub fn sql_type(&self) -> String {
        match self {
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Integer => "BIGINT".to_string(),
            FieldType::Float => "DOUBLE".to_string(),
            FieldType::Decimal { precision, scale } => format!("DECIMAL({precision}, {scale})"),
            FieldType::Text => "VARCHAR".to_string(),
            FieldType::Timestamp => "TIMESTAMP".to_string(),
            FieldType::Date => "DATE".to_string(),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Boolean => write!(f, "boolean"),
            FieldType::Integer => write!(f, "integer"),
            FieldType::Float => write!(f, "float"),
            FieldType::Decimal { precision, scale } => write!(f, "decimal({precision},{scale})"),
            FieldType::Text => write!(f, "text"),
            FieldType::Timestamp => write!(f, "timestamp"),
            FieldType::Date => write!(f, "date"),
        }
    }
}

/// One column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Column type
    #[serde(flatten)]
    pub field_type: FieldType,
    /// Dot-separated path into the upstream item (defaults to the name)
    #[serde(default)]
    pub path: Option<String>,
}

impl ColumnDef {
    /// Create a column read from the field of the same name
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            path: None,
        }
    }

    /// Read the column from a different upstream path
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Upstream path for this column
    pub fn source_path(&self) -> &str {
        self.path.as_deref().unwrap_or(&self.name)
    }
}

/// Typed description of one table in the relational store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name
    pub name: String,
    /// Columns in declaration order
    pub columns: Vec<ColumnDef>,
    /// Primary key columns
    pub primary_key: Vec<String>,
}

impl TableSchema {
    /// Create a new schema
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>, primary_key: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Check that the primary key is declared and names existing columns
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("table name must not be empty"));
        }
        if self.primary_key.is_empty() {
            return Err(Error::config(format!(
                "table '{}' has no primary key",
                self.name
            )));
        }
        for key in &self.primary_key {
            if self.column(key).is_none() {
                return Err(Error::config(format!(
                    "primary key column '{key}' is not a column of '{}'",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Whether a column is part of the primary key
    pub fn is_key_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|k| k == name)
    }

    /// An empty table with this schema's columns and key
    pub fn empty_table(&self) -> Table {
        Table::new(&self.name, self.column_names(), self.primary_key.clone())
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this schema
    pub fn create_table_sql(&self) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), c.field_type.sql_type()))
            .collect();

        let key = self
            .primary_key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        defs.push(format!("PRIMARY KEY ({key})"));

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&self.name),
            defs.join(", ")
        )
    }

    /// Map an upstream JSON item onto a record of this schema
    pub fn record_from_json(&self, item: &JsonValue) -> Result<Record> {
        let mut record = Record::new();
        for column in &self.columns {
            let raw = lookup_path(item, column.source_path()).unwrap_or(&JsonValue::Null);
            let value = coerce(raw, column.field_type).map_err(|message| {
                Error::decode(format!(
                    "table '{}', column '{}': {message}",
                    self.name, column.name
                ))
            })?;
            record.insert(column.name.clone(), value);
        }
        Ok(record)
    }
}

/// Quote an SQL identifier
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
