//! JSON to record mapping
//!
//! Converts upstream JSON scalars into typed field values.

use super::types::FieldType;
use crate::types::{FieldValue, JsonValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Look up a value by dot-separated path, e.g. `gear.name` or `$.gear.name`
pub fn lookup_path<'a>(value: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    let mut current = value;
    for part in path.split('.') {
        match current {
            JsonValue::Object(map) => current = map.get(part)?,
            JsonValue::Array(items) => current = items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Coerce a JSON value into a field value of the given type
pub fn coerce(value: &JsonValue, field_type: FieldType) -> Result<FieldValue, String> {
    if value.is_null() {
        return Ok(FieldValue::Null);
    }

    let converted = match field_type {
        FieldType::Boolean => match value {
            JsonValue::Bool(b) => Some(FieldValue::Boolean(*b)),
            JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(FieldValue::Boolean(true)),
                "false" => Some(FieldValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        },
        FieldType::Integer => match value {
            JsonValue::Number(n) => n.as_i64().map(FieldValue::Integer).or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| FieldValue::Integer(f as i64))
            }),
            JsonValue::String(s) => s.trim().parse().ok().map(FieldValue::Integer),
            _ => None,
        },
        FieldType::Float => match value {
            JsonValue::Number(n) => n.as_f64().map(FieldValue::Float),
            JsonValue::String(s) => s.trim().parse().ok().map(FieldValue::Float),
            _ => None,
        },
        FieldType::Decimal { scale, .. } => match value {
            JsonValue::Number(n) => rescale_decimal(&n.to_string(), scale).map(FieldValue::Decimal),
            JsonValue::String(s) => rescale_decimal(s.trim(), scale).map(FieldValue::Decimal),
            _ => None,
        },
        FieldType::Text => match value {
            JsonValue::String(s) => Some(FieldValue::Text(s.clone())),
            JsonValue::Number(n) => Some(FieldValue::Text(n.to_string())),
            JsonValue::Bool(b) => Some(FieldValue::Text(b.to_string())),
            other => Some(FieldValue::Text(other.to_string())),
        },
        FieldType::Timestamp => match value {
            JsonValue::String(s) => parse_timestamp(s).map(FieldValue::Timestamp),
            JsonValue::Number(n) => n
                .as_i64()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .map(FieldValue::Timestamp),
            _ => None,
        },
        FieldType::Date => match value {
            JsonValue::String(s) => parse_date(s).map(FieldValue::Date),
            _ => None,
        },
    };

    converted.ok_or_else(|| format!("cannot convert {value} to {field_type}"))
}

/// Parse a timestamp in RFC 3339 or a naive ISO-like form (taken as UTC)
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %z") {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a calendar date, accepting a full timestamp and keeping its UTC date
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(text).map(|ts| ts.date_naive()))
}

/// Render a decimal literal with exactly `scale` fractional digits
fn rescale_decimal(text: &str, scale: u8) -> Option<String> {
    let scale = scale as usize;
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    let well_formed = !int_part.is_empty()
        && int_part.chars().all(|c| c.is_ascii_digit())
        && frac_part.chars().all(|c| c.is_ascii_digit());
    if !well_formed {
        // Exponent notation and the like: go through f64
        let parsed: f64 = text.parse().ok()?;
        return Some(format!("{parsed:.scale$}"));
    }

    if frac_part.len() > scale {
        let parsed: f64 = text.parse().ok()?;
        return Some(format!("{parsed:.scale$}"));
    }

    let sign = if negative { "-" } else { "" };
    if scale == 0 {
        return Some(format!("{sign}{int_part}"));
    }
    Some(format!("{sign}{int_part}.{frac_part:0<scale$}"))
}

#[cfg(test)]
mod mapping_tests {
    use super::*;

    #[test]
    fn test_rescale_decimal() {
        assert_eq!(rescale_decimal("20", 2).as_deref(), Some("20.00"));
        assert_eq!(rescale_decimal("20.5", 2).as_deref(), Some("20.50"));
        assert_eq!(rescale_decimal("-3.1", 3).as_deref(), Some("-3.100"));
        assert_eq!(rescale_decimal("1.239", 2).as_deref(), Some("1.24"));
        assert_eq!(rescale_decimal("7", 0).as_deref(), Some("7"));
        assert_eq!(rescale_decimal("abc", 2), None);
    }
}
