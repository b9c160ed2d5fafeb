use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta};
use duckdb::arrow::datatypes::DataType;
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use thiserror::Error;

/// One result row; key order follows the result's column order.
pub type Row = Map<String, JsonValue>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TabularResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// The `result` payload handed to callers: a table or an error, never both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QueryOutcome {
    Table(TabularResult),
    Error { error: String },
}

impl QueryOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, QueryOutcome::Error { .. })
    }
}

impl From<Result<TabularResult, ExecutionError>> for QueryOutcome {
    fn from(result: Result<TabularResult, ExecutionError>) -> Self {
        match result {
            Ok(table) => QueryOutcome::Table(table),
            Err(e) => QueryOutcome::Error { error: e.message },
        }
    }
}

/// Engine failure; `message` is the engine's text, unedited.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ExecutionError {
    pub message: String,
}

impl ExecutionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<duckdb::Error> for ExecutionError {
    fn from(err: duckdb::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Something that can run a candidate query to completion.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, sql: &str) -> Result<TabularResult, ExecutionError>;
}

/// Runs `sql` as-is and collects every row.
pub fn execute(conn: &Connection, sql: &str) -> Result<TabularResult, ExecutionError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let columns = unique_column_names(rows.as_ref().map(|s| s.column_names()).unwrap_or_default());
    // Zoned timestamps arrive as UTC instants; the zone only shows in the column type
    let zoned: Vec<bool> = match rows.as_ref() {
        Some(stmt) => (0..columns.len())
            .map(|idx| matches!(stmt.column_type(idx), DataType::Timestamp(_, Some(_))))
            .collect(),
        None => vec![false; columns.len()],
    };

    let mut collected = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            let value: Value = row.get(idx)?;
            let json = match value {
                Value::Timestamp(unit, v) if zoned[idx] => zoned_timestamp(unit, v),
                other => to_json(other),
            };
            record.insert(name.clone(), json);
        }
        collected.push(record);
    }

    Ok(TabularResult {
        columns,
        rows: collected,
    })
}

/// `SELECT a.id, b.id` yields `id`, `id_1` so row maps keep every column.
fn unique_column_names(names: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}_{}", name, suffix);
            suffix += 1;
        }
        seen.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

fn to_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn zoned_timestamp(unit: TimeUnit, value: i64) -> JsonValue {
    DateTime::from_timestamp_micros(to_micros(unit, value))
        .map(|ts| JsonValue::String(ts.to_rfc3339()))
        .unwrap_or(JsonValue::Null)
}

/// Map keys become object keys; non-text keys use their JSON text.
fn map_key(key: Value) -> String {
    match to_json(key) {
        JsonValue::String(text) => text,
        other => other.to_string(),
    }
}

fn to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(v) => JsonValue::from(v),
        Value::TinyInt(v) => JsonValue::from(v),
        Value::SmallInt(v) => JsonValue::from(v),
        Value::Int(v) => JsonValue::from(v),
        Value::BigInt(v) => JsonValue::from(v),
        Value::HugeInt(v) => i64::try_from(v)
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(v.to_string())),
        Value::UTinyInt(v) => JsonValue::from(v),
        Value::USmallInt(v) => JsonValue::from(v),
        Value::UInt(v) => JsonValue::from(v),
        Value::UBigInt(v) => JsonValue::from(v),
        Value::Float(v) => JsonValue::from(v),
        Value::Double(v) => JsonValue::from(v),
        // Decimal precision would be lost as a JSON float
        Value::Decimal(v) => JsonValue::String(v.to_string()),
        Value::Text(v) | Value::Enum(v) => JsonValue::String(v),
        Value::Blob(v) => JsonValue::String(format!("<{} bytes>", v.len())),
        Value::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(TimeDelta::days(i64::from(days))))
            .map(|date| JsonValue::String(date.to_string()))
            .unwrap_or(JsonValue::Null),
        Value::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(unit, v))
            .map(|ts| JsonValue::String(ts.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
            .unwrap_or(JsonValue::Null),
        Value::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            let secs = u32::try_from(micros.div_euclid(1_000_000)).unwrap_or(0);
            let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).unwrap_or(0);
            NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                .map(|t| JsonValue::String(t.to_string()))
                .unwrap_or(JsonValue::Null)
        }
        Value::Interval { months, days, nanos } => {
            let mut interval = Map::with_capacity(3);
            interval.insert("months".to_string(), JsonValue::from(months));
            interval.insert("days".to_string(), JsonValue::from(days));
            interval.insert("nanos".to_string(), JsonValue::from(nanos));
            JsonValue::Object(interval)
        }
        Value::List(items) | Value::Array(items) => {
            JsonValue::Array(items.into_iter().map(to_json).collect())
        }
        Value::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, field)| (name.clone(), to_json(field.clone())))
                .collect(),
        ),
        Value::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(key, entry)| (map_key(key.clone()), to_json(entry.clone())))
                .collect(),
        ),
        Value::Union(inner) => to_json(*inner),
    }
}
