use chrono::{DateTime, NaiveDate, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use serde::Serialize;
use serde_json::{Map, Number, Value as JsonValue};
use std::error::Error;
use std::fmt;

use crate::db::executor::{ExecutionError, ExecutionOutcome};
use crate::llm::models::{SqlSource, TranslationResult};

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalingError {
    pub column: String,
    pub detail: String,
}

impl fmt::Display for MarshalingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "value in column '{}' cannot be represented as JSON: {}",
            self.column, self.detail
        )
    }
}

impl Error for MarshalingError {}

pub type JsonRow = Map<String, JsonValue>;

/// The JSON body returned for every question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    /// The statement attempted; empty only when nothing was attempted.
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub source: SqlSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<JsonRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    fn base(question: Option<&str>, translation: Option<&TranslationResult>) -> Self {
        let fallback_reason = match translation {
            Some(TranslationResult::FallbackUsed { reason, .. }) => Some(reason.to_string()),
            _ => None,
        };

        Self {
            success: false,
            sql: translation.map(|t| t.sql().to_string()).unwrap_or_default(),
            question: question.map(str::to_string),
            source: translation.map(|t| t.source()).unwrap_or(SqlSource::None),
            fallback_reason,
            columns: None,
            results: None,
            rows_affected: None,
            message: None,
            error: None,
        }
    }

    /// Failure before any SQL was produced.
    pub fn failure(question: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(question, None)
        }
    }
}

/// Converts a single DuckDB value. Temporal values become ISO-8601 text.
pub fn to_json(value: &Value) -> Result<JsonValue, String> {
    let json = match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::TinyInt(v) => JsonValue::from(*v),
        Value::SmallInt(v) => JsonValue::from(*v),
        Value::Int(v) => JsonValue::from(*v),
        Value::BigInt(v) => JsonValue::from(*v),
        Value::UTinyInt(v) => JsonValue::from(*v),
        Value::USmallInt(v) => JsonValue::from(*v),
        Value::UInt(v) => JsonValue::from(*v),
        Value::UBigInt(v) => JsonValue::from(*v),
        // Beyond i64 the exact digits survive only as text.
        Value::HugeInt(v) => match i64::try_from(*v) {
            Ok(small) => JsonValue::from(small),
            Err(_) => JsonValue::String(v.to_string()),
        },
        Value::Float(v) => finite(f64::from(*v))?,
        Value::Double(v) => finite(*v)?,
        Value::Decimal(d) => JsonValue::String(d.to_string()),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Enum(s) => JsonValue::String(s.clone()),
        Value::Timestamp(unit, v) => JsonValue::String(timestamp_to_iso(*unit, *v)?),
        Value::Date32(days) => JsonValue::String(date_to_iso(*days)?),
        Value::Time64(unit, v) => JsonValue::String(time_to_iso(*unit, *v)?),
        Value::List(items) => JsonValue::Array(items.iter().map(to_json).collect::<Result<_, _>>()?),
        Value::Blob(_) => return Err("binary values are not supported".to_string()),
        other => return Err(format!("unsupported value {:?}", other)),
    };
    Ok(json)
}

fn finite(v: f64) -> Result<JsonValue, String> {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .ok_or_else(|| format!("non-finite number {}", v))
}

fn to_micros(unit: TimeUnit, value: i64) -> Option<i64> {
    match unit {
        TimeUnit::Second => value.checked_mul(1_000_000),
        TimeUnit::Millisecond => value.checked_mul(1_000),
        TimeUnit::Microsecond => Some(value),
        TimeUnit::Nanosecond => Some(value / 1_000),
    }
}

pub fn timestamp_to_iso(unit: TimeUnit, value: i64) -> Result<String, String> {
    to_micros(unit, value)
        .and_then(DateTime::from_timestamp_micros)
        .map(|dt| dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        .ok_or_else(|| format!("timestamp out of range: {}", value))
}

pub fn date_to_iso(days_since_epoch: i32) -> Result<String, String> {
    days_since_epoch
        .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| format!("date out of range: {}", days_since_epoch))
}

pub fn time_to_iso(unit: TimeUnit, value: i64) -> Result<String, String> {
    to_micros(unit, value)
        .and_then(|micros| {
            let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
            let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
            NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
        })
        .map(|t| t.format("%H:%M:%S%.f").to_string())
        .ok_or_else(|| format!("time out of range: {}", value))
}

/// Builds one JSON object per row, keys in driver column order.
pub fn marshal_rows(columns: &[String], rows: &[Vec<Value>]) -> Result<Vec<JsonRow>, MarshalingError> {
    rows.iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, value)| {
                    to_json(value)
                        .map(|json| (column.clone(), json))
                        .map_err(|detail| MarshalingError {
                            column: column.clone(),
                            detail,
                        })
                })
                .collect()
        })
        .collect()
}

/// Assembles the response envelope for an executed (or failed) statement.
///
/// A value that cannot be marshaled turns the whole response into a statement
/// failure; partial results are never returned.
pub fn marshal(question: &str, translation: &TranslationResult, outcome: ExecutionOutcome) -> ResponseEnvelope {
    let base = ResponseEnvelope::base(Some(question), Some(translation));

    match outcome {
        ExecutionOutcome::RowsReturned { columns, rows } => match marshal_rows(&columns, &rows) {
            Ok(results) => ResponseEnvelope {
                success: true,
                columns: Some(columns),
                results: Some(results),
                ..base
            },
            Err(e) => ResponseEnvelope {
                error: Some(ExecutionError::Statement(e.to_string()).to_string()),
                ..base
            },
        },
        ExecutionOutcome::RowsAffected { count } => ResponseEnvelope {
            success: true,
            rows_affected: Some(count),
            message: Some("Query executed successfully".to_string()),
            ..base
        },
        ExecutionOutcome::ExecutionFailed {
            reason,
            attempted_sql,
        } => ResponseEnvelope {
            sql: attempted_sql,
            error: Some(reason.to_string()),
            ..base
        },
    }
}
