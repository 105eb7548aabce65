//! Conversion of warehouse result rows into persistable cost records.
//!
//! BigQuery's REST responses encode floats and timestamps as JSON strings,
//! so every numeric accessor accepts both representations. A single bad
//! row fails the whole batch: partially ingested query results are worse
//! than a clean retry.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use thiserror::Error;

use super::WarehouseRow;
use crate::models::NewCostRecord;

#[derive(Debug, Error)]
#[error("failed to transform warehouse row: {reason} (row: {row})")]
pub struct TransformError {
    pub reason: String,
    /// The offending row, serialized for diagnostics.
    pub row: String,
}

impl TransformError {
    fn new(reason: impl Into<String>, row: &WarehouseRow) -> Self {
        Self {
            reason: reason.into(),
            row: Value::Object(row.clone()).to_string(),
        }
    }
}

/// Transform one aggregated billing row.
pub fn transform_row(row: &WarehouseRow) -> Result<NewCostRecord, TransformError> {
    Ok(NewCostRecord {
        service: required_string(row, "service")?,
        project: required_string(row, "project")?,
        sku: required_string(row, "sku")?,
        time_period: required_timestamp(row, "time_period")?,
        cost: required_f64(row, "cost")?,
        currency: required_string(row, "currency")?,
        usage_amount: optional_f64(row, "usage_amount")?,
        usage_unit: optional_string(row, "usage_unit"),
    })
}

/// Transform a batch, aborting on the first failure.
pub fn transform_rows(rows: &[WarehouseRow]) -> Result<Vec<NewCostRecord>, TransformError> {
    rows.iter().map(transform_row).collect()
}

fn required_string(row: &WarehouseRow, key: &str) -> Result<String, TransformError> {
    match row.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) | Some(Value::Null) | None => {
            Err(TransformError::new(format!("missing field {key:?}"), row))
        }
        Some(other) => Err(TransformError::new(
            format!("field {key:?} is not a string: {other}"),
            row,
        )),
    }
}

fn optional_string(row: &WarehouseRow, key: &str) -> Option<String> {
    match row.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn parse_f64(key: &str, value: &Value, row: &WarehouseRow) -> Result<f64, TransformError> {
    match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| {
            TransformError::new(format!("field {key:?} is out of range: {n}"), row)
        }),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| {
            TransformError::new(format!("field {key:?} is not numeric: {s:?}"), row)
        }),
        other => Err(TransformError::new(
            format!("field {key:?} is not numeric: {other}"),
            row,
        )),
    }
}

fn required_f64(row: &WarehouseRow, key: &str) -> Result<f64, TransformError> {
    match row.get(key) {
        Some(Value::Null) | None => Err(TransformError::new(format!("missing field {key:?}"), row)),
        Some(value) => parse_f64(key, value, row),
    }
}

fn optional_f64(row: &WarehouseRow, key: &str) -> Result<Option<f64>, TransformError> {
    match row.get(key) {
        Some(Value::Null) | None => Ok(None),
        Some(value) => parse_f64(key, value, row).map(Some),
    }
}

/// Accepts plain dates (the `DATE()` aggregation output) and RFC 3339
/// timestamps. Dates land at midnight UTC.
fn required_timestamp(row: &WarehouseRow, key: &str) -> Result<DateTime<Utc>, TransformError> {
    let raw = match row.get(key) {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Null) | None => {
            return Err(TransformError::new(format!("missing field {key:?}"), row))
        }
        Some(other) => {
            return Err(TransformError::new(
                format!("field {key:?} is not a timestamp: {other}"),
                row,
            ))
        }
    };

    if let Ok(date) = raw.parse::<NaiveDate>() {
        return Ok(date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc());
    }
    raw.parse::<DateTime<Utc>>().map_err(|_| {
        TransformError::new(format!("field {key:?} is not a valid date: {raw:?}"), row)
    })
}
