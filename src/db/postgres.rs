//! PostgreSQL session over a single sqlx connection.

use super::connection::{Connector, DbSession, QueryOutput};
use crate::config::DatabaseConfig;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, PgTypeInfo, PgTypeKind, PgValueFormat};
use sqlx::types::Decimal;
use sqlx::{Column, Connection, Executor, Row, Statement, TypeInfo, ValueRef};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use tracing::{debug, warn};

pub struct PgConnector {
    options: PgConnectOptions,
    connect_timeout: Duration,
    target: String,
}

impl PgConnector {
    pub fn new(options: PgConnectOptions, connect_timeout: Duration, target: String) -> Self {
        Self {
            options,
            connect_timeout,
            target,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Ok(Self::new(
            config.connect_options()?,
            config.connect_timeout,
            config.redacted(),
        ))
    }
}

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn DbSession>> {
        let conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
            .await
            .map_err(|_| {
                EngineError::Connection(format!(
                    "Timed out after {}s connecting to {}",
                    self.connect_timeout.as_secs(),
                    self.target
                ))
            })?
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        Ok(Box::new(PgSession { conn }))
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

struct PgSession {
    conn: PgConnection,
}

#[async_trait]
impl DbSession for PgSession {
    async fn ping(&mut self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&mut self.conn).await?;
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> Result<QueryOutput> {
        // Preparing first gives column names even when no rows come back.
        let statement = (&mut self.conn).prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let rows = statement.query().fetch_all(&mut self.conn).await?;
        let rows = rows.iter().map(row_values).collect();

        Ok(QueryOutput { columns, rows })
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            debug!("Error while closing connection: {}", e);
        }
    }
}

fn row_values(row: &PgRow) -> Vec<Value> {
    (0..row.len()).map(|idx| column_value(row, idx)).collect()
}

/// How a cell of a given PostgreSQL type becomes JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CellKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Money,
    Oid,
    Text,
    Uuid,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
    Interval,
    Json,
    Bytea,
    Inet,
    MacAddr,
    /// Enum labels travel as UTF-8 text in both wire formats.
    Label,
    Array(ElementKind),
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Uuid,
    Date,
    Timestamp,
    TimestampTz,
}

fn cell_kind(type_info: &PgTypeInfo) -> CellKind {
    classify(type_info.kind(), type_info.name())
}

fn classify(kind: &PgTypeKind, name: &str) -> CellKind {
    match kind {
        PgTypeKind::Enum(_) => CellKind::Label,
        PgTypeKind::Domain(base) => cell_kind(base),
        _ => cell_kind_by_name(name),
    }
}

fn cell_kind_by_name(name: &str) -> CellKind {
    if let Some(element) = name.strip_suffix("[]") {
        return element_kind(element).map_or(CellKind::Unsupported, CellKind::Array);
    }
    match name {
        "BOOL" => CellKind::Bool,
        "INT2" => CellKind::Int2,
        "INT4" => CellKind::Int4,
        "INT8" => CellKind::Int8,
        "FLOAT4" => CellKind::Float4,
        "FLOAT8" => CellKind::Float8,
        "NUMERIC" => CellKind::Numeric,
        "MONEY" => CellKind::Money,
        "OID" => CellKind::Oid,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" | "CITEXT" | "citext" => CellKind::Text,
        "UUID" => CellKind::Uuid,
        "DATE" => CellKind::Date,
        "TIME" => CellKind::Time,
        "TIMETZ" => CellKind::TimeTz,
        "TIMESTAMP" => CellKind::Timestamp,
        "TIMESTAMPTZ" => CellKind::TimestampTz,
        "INTERVAL" => CellKind::Interval,
        "JSON" | "JSONB" => CellKind::Json,
        "BYTEA" => CellKind::Bytea,
        "INET" | "CIDR" => CellKind::Inet,
        "MACADDR" => CellKind::MacAddr,
        _ => CellKind::Unsupported,
    }
}

fn element_kind(name: &str) -> Option<ElementKind> {
    Some(match name {
        "BOOL" => ElementKind::Bool,
        "INT2" => ElementKind::Int2,
        "INT4" => ElementKind::Int4,
        "INT8" => ElementKind::Int8,
        "FLOAT4" => ElementKind::Float4,
        "FLOAT8" => ElementKind::Float8,
        "NUMERIC" => ElementKind::Numeric,
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => ElementKind::Text,
        "UUID" => ElementKind::Uuid,
        "DATE" => ElementKind::Date,
        "TIMESTAMP" => ElementKind::Timestamp,
        "TIMESTAMPTZ" => ElementKind::TimestampTz,
        _ => return None,
    })
}

fn get<'r, T>(row: &'r PgRow, idx: usize, convert: impl FnOnce(T) -> Value) -> Value
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => convert(v),
        Ok(None) => Value::Null,
        Err(e) => undecodable(row, idx, e),
    }
}

fn get_array<'r, T>(row: &'r PgRow, idx: usize, convert: impl Fn(T) -> Value) -> Value
where
    Vec<Option<T>>: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    get::<Vec<Option<T>>>(row, idx, |items| {
        Value::Array(
            items
                .into_iter()
                .map(|item| item.map_or(Value::Null, &convert))
                .collect(),
        )
    })
}

/// Decode from the raw wire bytes with a hand-written parser.
fn get_raw(row: &PgRow, idx: usize, parse: impl FnOnce(&[u8]) -> Option<String>) -> Value {
    let raw = match row.try_get_raw(idx) {
        Ok(raw) => raw,
        Err(e) => return undecodable(row, idx, e),
    };
    if raw.is_null() {
        return Value::Null;
    }
    let parsed = match raw.format() {
        PgValueFormat::Text => raw.as_str().ok().map(str::to_string),
        PgValueFormat::Binary => raw.as_bytes().ok().and_then(parse),
    };
    parsed
        .map(Value::String)
        .unwrap_or_else(|| unsupported(row.column(idx).type_info()))
}

fn undecodable(row: &PgRow, idx: usize, e: impl std::fmt::Display) -> Value {
    let column = row.column(idx);
    warn!("Could not decode column {} ({}): {}", column.name(), column.type_info(), e);
    unsupported(column.type_info())
}

/// Visible stand-in so a value that could not be decoded is never mistaken for NULL.
fn unsupported(type_info: &PgTypeInfo) -> Value {
    Value::String(format!("<unsupported {}>", type_info.name()))
}

fn decimal_value(d: Decimal) -> Value {
    d.to_f64().map(Value::from).unwrap_or_else(|| Value::String(d.to_string()))
}

fn date_value(d: NaiveDate) -> Value {
    Value::String(d.format("%Y-%m-%d").to_string())
}

fn timestamp_value(t: NaiveDateTime) -> Value {
    Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn timestamptz_value(t: DateTime<Utc>) -> Value {
    Value::String(t.to_rfc3339())
}

/// Decode one cell into JSON by its PostgreSQL type.
fn column_value(row: &PgRow, idx: usize) -> Value {
    let type_info = row.column(idx).type_info().clone();
    match cell_kind(&type_info) {
        CellKind::Bool => get::<bool>(row, idx, Value::Bool),
        CellKind::Int2 => get::<i16>(row, idx, Value::from),
        CellKind::Int4 => get::<i32>(row, idx, Value::from),
        CellKind::Int8 => get::<i64>(row, idx, Value::from),
        CellKind::Float4 => get::<f32>(row, idx, |v| Value::from(f64::from(v))),
        CellKind::Float8 => get::<f64>(row, idx, Value::from),
        CellKind::Numeric => get::<Decimal>(row, idx, decimal_value),
        // Two fractional digits covers the common lc_monetary locales.
        CellKind::Money => get::<PgMoney>(row, idx, |m| decimal_value(m.to_decimal(2))),
        CellKind::Oid => get::<Oid>(row, idx, |o| Value::from(o.0)),
        CellKind::Text => get::<String>(row, idx, Value::String),
        CellKind::Uuid => get::<uuid::Uuid>(row, idx, |u| Value::String(u.to_string())),
        CellKind::Date => get::<NaiveDate>(row, idx, date_value),
        CellKind::Time => get::<NaiveTime>(row, idx, |t| Value::String(t.format("%H:%M:%S").to_string())),
        CellKind::TimeTz => get::<PgTimeTz<NaiveTime, FixedOffset>>(row, idx, |t| {
            Value::String(format!("{}{}", t.time.format("%H:%M:%S"), t.offset))
        }),
        CellKind::Timestamp => get::<NaiveDateTime>(row, idx, timestamp_value),
        CellKind::TimestampTz => get::<DateTime<Utc>>(row, idx, timestamptz_value),
        CellKind::Interval => get::<PgInterval>(row, idx, |i| Value::String(format_interval(&i))),
        CellKind::Json => get::<Value>(row, idx, |v| v),
        CellKind::Bytea => get::<Vec<u8>>(row, idx, |b| Value::String(format!("<{} bytes>", b.len()))),
        CellKind::Inet => get_raw(row, idx, parse_inet),
        CellKind::MacAddr => get_raw(row, idx, parse_macaddr),
        CellKind::Label => match row.try_get_unchecked::<Option<String>, _>(idx) {
            Ok(label) => label.map_or(Value::Null, Value::String),
            Err(e) => undecodable(row, idx, e),
        },
        CellKind::Array(element) => match element {
            ElementKind::Bool => get_array::<bool>(row, idx, Value::Bool),
            ElementKind::Int2 => get_array::<i16>(row, idx, Value::from),
            ElementKind::Int4 => get_array::<i32>(row, idx, Value::from),
            ElementKind::Int8 => get_array::<i64>(row, idx, Value::from),
            ElementKind::Float4 => get_array::<f32>(row, idx, |v| Value::from(f64::from(v))),
            ElementKind::Float8 => get_array::<f64>(row, idx, Value::from),
            ElementKind::Numeric => get_array::<Decimal>(row, idx, decimal_value),
            ElementKind::Text => get_array::<String>(row, idx, Value::String),
            ElementKind::Uuid => get_array::<uuid::Uuid>(row, idx, |u| Value::String(u.to_string())),
            ElementKind::Date => get_array::<NaiveDate>(row, idx, date_value),
            ElementKind::Timestamp => get_array::<NaiveDateTime>(row, idx, timestamp_value),
            ElementKind::TimestampTz => get_array::<DateTime<Utc>>(row, idx, timestamptz_value),
        },
        CellKind::Unsupported => get_raw(row, idx, |_| None),
    }
}

/// Render an interval the way psql does, e.g. `1 year 2 mons 3 days 04:05:06`.
fn format_interval(interval: &PgInterval) -> String {
    let mut parts = Vec::new();
    let years = interval.months / 12;
    let months = interval.months % 12;
    let plural = |n: i32, unit: &str| {
        if n.abs() == 1 {
            format!("{} {}", n, unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };
    if years != 0 {
        parts.push(plural(years, "year"));
    }
    if months != 0 {
        parts.push(plural(months, "mon"));
    }
    if interval.days != 0 {
        parts.push(plural(interval.days, "day"));
    }

    if interval.microseconds != 0 || parts.is_empty() {
        let sign = if interval.microseconds < 0 { "-" } else { "" };
        let micros = interval.microseconds.unsigned_abs();
        let secs = micros / 1_000_000;
        let mut time = format!(
            "{}{:02}:{:02}:{:02}",
            sign,
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        );
        let frac = micros % 1_000_000;
        if frac != 0 {
            let digits = format!("{:06}", frac);
            time.push('.');
            time.push_str(digits.trim_end_matches('0'));
        }
        parts.push(time);
    }

    parts.join(" ")
}

/// Binary INET/CIDR: family, prefix bits, is_cidr flag, address length, address.
fn parse_inet(bytes: &[u8]) -> Option<String> {
    let (&family, rest) = bytes.split_first()?;
    let (&bits, rest) = rest.split_first()?;
    let (&is_cidr, rest) = rest.split_first()?;
    let (&len, addr) = rest.split_first()?;
    if addr.len() != usize::from(len) {
        return None;
    }

    let (text, full_bits) = match family {
        2 => {
            let octets: [u8; 4] = addr.try_into().ok()?;
            (Ipv4Addr::from(octets).to_string(), 32)
        }
        3 => {
            let octets: [u8; 16] = addr.try_into().ok()?;
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        _ => return None,
    };

    if is_cidr != 0 || bits != full_bits {
        Some(format!("{}/{}", text, bits))
    } else {
        Some(text)
    }
}

fn parse_macaddr(bytes: &[u8]) -> Option<String> {
    if bytes.len() != 6 {
        return None;
    }
    Some(
        bytes
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<Vec<_>>()
            .join(":"),
    )
}
