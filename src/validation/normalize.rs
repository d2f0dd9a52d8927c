//! Temporal normalisation applied to both sides before comparison
//!
//! A staged snapshot and a table read back from the database can spell the
//! same instant differently: sub-second precision, text versus typed
//! values, a timestamp where the column is really a date. Each column is
//! classified once from both tables, then both tables are rewritten with
//! the same rule.

use crate::schema::{parse_date, parse_timestamp};
use crate::types::{FieldValue, Table};
use chrono::{DateTime, SubsecRound, Utc};
use std::collections::HashMap;

/// Temporal kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Timestamp,
    Date,
}

/// Classify columns by the first typed temporal value found in either table.
///
/// A column holding a date on either side is a date column.
pub fn temporal_columns(staged: &Table, persisted: &Table) -> HashMap<String, TemporalKind> {
    let mut kinds = HashMap::new();
    for row in staged.rows.iter().chain(&persisted.rows) {
        for (column, value) in row {
            let kind = match value {
                FieldValue::Date(_) => TemporalKind::Date,
                FieldValue::Timestamp(_) => TemporalKind::Timestamp,
                _ => continue,
            };
            let entry = kinds.entry(column.clone()).or_insert(kind);
            if kind == TemporalKind::Date {
                *entry = TemporalKind::Date;
            }
        }
    }
    kinds
}

/// Truncate to whole seconds in UTC
fn truncate(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(0)
}

/// Normalise one value of a column of the given kind
pub fn normalize_value(value: &FieldValue, kind: Option<TemporalKind>) -> FieldValue {
    match (kind, value) {
        (_, v) if v.is_null() => FieldValue::Null,
        (Some(TemporalKind::Timestamp), FieldValue::Timestamp(ts)) => {
            FieldValue::Timestamp(truncate(*ts))
        }
        (Some(TemporalKind::Timestamp), FieldValue::Text(text)) => parse_timestamp(text)
            .map_or_else(|| value.clone(), |ts| FieldValue::Timestamp(truncate(ts))),
        (Some(TemporalKind::Timestamp), FieldValue::Date(d)) => d
            .and_hms_opt(0, 0, 0)
            .map_or_else(|| value.clone(), |naive| FieldValue::Timestamp(naive.and_utc())),
        (Some(TemporalKind::Date), FieldValue::Timestamp(ts)) => FieldValue::Date(ts.date_naive()),
        (Some(TemporalKind::Date), FieldValue::Text(text)) => {
            parse_date(text).map_or_else(|| value.clone(), FieldValue::Date)
        }
        (None, FieldValue::Timestamp(ts)) => FieldValue::Timestamp(truncate(*ts)),
        _ => value.clone(),
    }
}

/// Normalise every temporal column of a table
pub fn normalize_table(table: &Table, kinds: &HashMap<String, TemporalKind>) -> Table {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(column, value)| {
                    let kind = kinds.get(column).copied();
                    (column.clone(), normalize_value(value, kind))
                })
                .collect()
        })
        .collect();

    Table {
        rows,
        ..table.clone()
    }
}

/// Normalise both sides with the same column classification
pub fn normalize_pair(staged: &Table, persisted: &Table) -> (Table, Table) {
    let kinds = temporal_columns(staged, persisted);
    (
        normalize_table(staged, &kinds),
        normalize_table(persisted, &kinds),
    )
}
