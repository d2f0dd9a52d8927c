//! DuckDB-backed relational store
//!
//! One table per record type, each with a declared primary key. Writes go
//! through `INSERT ... ON CONFLICT DO UPDATE`, one statement per record, so
//! a failing record never takes the rest of its batch down with it.

use super::types::UpsertResult;
use crate::error::{Error, Result};
use crate::schema::{parse_date, parse_timestamp, quote_ident, FieldType, TableSchema};
use crate::types::{key_repr, FieldValue, Record, Table};
use duckdb::types::Value as DbValue;
use duckdb::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Relational store using DuckDB
pub struct DatabaseEngine {
    /// DuckDB connection
    conn: Mutex<Connection>,
    /// Where the database lives (for logging)
    location: String,
}

impl DatabaseEngine {
    /// Open (or create) a database file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::config(format!("Failed to open {}: {e}", path.display())))?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: path.display().to_string(),
        })
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            location: ":memory:".to_string(),
        })
    }

    /// Where the database lives
    pub fn location(&self) -> &str {
        &self.location
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the table for a schema if it does not exist yet
    pub fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        schema.validate()?;
        let sql = schema.create_table_sql();
        debug!("Executing: {}", sql);
        self.conn().execute_batch(&sql)?;
        Ok(())
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> Result<usize> {
        count_rows(&self.conn(), table)
    }

    /// Insert or overwrite records by primary key.
    ///
    /// Every column of the schema is written; a column missing from a record
    /// is written as null. A record that fails is logged and counted, and
    /// the batch continues.
    pub fn upsert(&self, schema: &TableSchema, records: &[Record]) -> Result<UpsertResult> {
        let sql = upsert_sql(schema);
        let conn = self.conn();
        let before = count_rows(&conn, &schema.name)?;

        let mut result = UpsertResult::default();
        {
            let mut stmt = conn.prepare(&sql)?;
            for (index, record) in records.iter().enumerate() {
                let params: Vec<DbValue> = schema
                    .columns
                    .iter()
                    .map(|c| to_db_value(record.get(&c.name).unwrap_or(&FieldValue::Null)))
                    .collect();

                match stmt.execute(duckdb::params_from_iter(params)) {
                    Ok(_) => result.persisted.push(index),
                    Err(e) => {
                        let key = key_repr(&Table::key_of(record, &schema.primary_key));
                        let err = Error::persistence(&schema.name, key, e.to_string());
                        warn!(table = %schema.name, "{err}");
                        result.failed += 1;
                    }
                }
            }
        }

        let after = count_rows(&conn, &schema.name)?;
        result.inserted = after.saturating_sub(before);
        result.updated = result.persisted.len().saturating_sub(result.inserted);

        info!(
            table = %schema.name,
            inserted = result.inserted,
            updated = result.updated,
            failed = result.failed,
            "Upsert complete"
        );
        Ok(result)
    }

    /// Read a whole table back, ordered by primary key
    pub fn fetch_table(&self, schema: &TableSchema) -> Result<Table> {
        let select = schema
            .columns
            .iter()
            .map(|c| match c.field_type {
                FieldType::Boolean | FieldType::Integer | FieldType::Float => quote_ident(&c.name),
                _ => format!("CAST({} AS VARCHAR)", quote_ident(&c.name)),
            })
            .collect::<Vec<_>>()
            .join(", ");
        let order = schema
            .primary_key
            .iter()
            .map(|k| quote_ident(k))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select} FROM {} ORDER BY {order}",
            quote_ident(&schema.name)
        );

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut table = schema.empty_table();
        while let Some(row) = rows.next()? {
            let mut record = Record::new();
            for (i, column) in schema.columns.iter().enumerate() {
                let value = match column.field_type {
                    FieldType::Boolean => row
                        .get::<_, Option<bool>>(i)?
                        .map_or(FieldValue::Null, FieldValue::Boolean),
                    FieldType::Integer => row
                        .get::<_, Option<i64>>(i)?
                        .map_or(FieldValue::Null, FieldValue::Integer),
                    FieldType::Float => row
                        .get::<_, Option<f64>>(i)?
                        .map_or(FieldValue::Null, FieldValue::Float),
                    field_type => match row.get::<_, Option<String>>(i)? {
                        Some(text) => from_db_text(&text, field_type)?,
                        None => FieldValue::Null,
                    },
                };
                record.insert(column.name.clone(), value);
            }
            table.rows.push(record);
        }

        Ok(table)
    }
}

impl std::fmt::Debug for DatabaseEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseEngine")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

fn count_rows(conn: &Connection, table: &str) -> Result<usize> {
    let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count as usize)
}

/// `INSERT ... ON CONFLICT (pk) DO UPDATE SET` statement for a schema.
///
/// Values are bound as text where needed and cast to the column type.
pub(crate) fn upsert_sql(schema: &TableSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = schema
        .columns
        .iter()
        .map(|c| format!("CAST(? AS {})", c.field_type.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    let key = schema
        .primary_key
        .iter()
        .map(|k| quote_ident(k))
        .collect::<Vec<_>>()
        .join(", ");

    let updates: Vec<String> = schema
        .columns
        .iter()
        .filter(|c| !schema.is_key_column(&c.name))
        .map(|c| format!("{0} = EXCLUDED.{0}", quote_ident(&c.name)))
        .collect();

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    format!(
        "INSERT INTO {} ({columns}) VALUES ({placeholders}) ON CONFLICT ({key}) {action}",
        quote_ident(&schema.name)
    )
}

/// Convert a field value into a bind parameter
fn to_db_value(value: &FieldValue) -> DbValue {
    match value {
        FieldValue::Null => DbValue::Null,
        FieldValue::Boolean(b) => DbValue::Boolean(*b),
        FieldValue::Integer(i) => DbValue::BigInt(*i),
        FieldValue::Float(f) if f.is_nan() => DbValue::Null,
        FieldValue::Float(f) => DbValue::Double(*f),
        FieldValue::Decimal(d) => DbValue::Text(d.clone()),
        FieldValue::Text(s) => DbValue::Text(s.clone()),
        FieldValue::Timestamp(ts) => {
            DbValue::Text(ts.naive_utc().format("%Y-%m-%d %H:%M:%S%.f").to_string())
        }
        FieldValue::Date(d) => DbValue::Text(d.format("%Y-%m-%d").to_string()),
    }
}

/// Convert a column read back as text into a field value of its type
fn from_db_text(text: &str, field_type: FieldType) -> Result<FieldValue> {
    let value = match field_type {
        FieldType::Decimal { .. } => Some(FieldValue::Decimal(text.to_string())),
        FieldType::Text => Some(FieldValue::Text(text.to_string())),
        FieldType::Timestamp => parse_timestamp(text).map(FieldValue::Timestamp),
        FieldType::Date => parse_date(text).map(FieldValue::Date),
        FieldType::Boolean => text.parse().ok().map(FieldValue::Boolean),
        FieldType::Integer => text.parse().ok().map(FieldValue::Integer),
        FieldType::Float => text.parse().ok().map(FieldValue::Float),
    };
    value.ok_or_else(|| Error::decode(format!("cannot read '{text}' as {field_type}")))
}
