use std::time::Duration;

use askdb_core::config::{DatabaseBackend, DatabaseConfig};
use askdb_core::{BackendError, BackendSession, NativeValue, QueryOutput, SqlBackend};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::types::{Oid, PgInterval, PgMoney, PgTimeTz};
use sqlx::postgres::{
    PgArguments, PgConnectOptions, PgConnection, PgHasArrayType, PgRow, PgValueFormat,
};
use sqlx::{
    Column, Connection, Decode, Executor, Postgres, Row, Statement, Type, TypeInfo, ValueRef,
};
use tracing::debug;

use crate::connection::{
    connect_timeout, postgres_options, query_error, statement_timeout, with_connect_timeout,
};
use crate::sqlite::first_column_text;

const LIST_TABLES_SQL: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE' ORDER BY table_name";
const LIST_COLUMNS_SQL: &str = "SELECT column_name::text FROM information_schema.columns \
     WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position";

/// Client-server backend. Sessions are read-only and carry a server-side
/// statement timeout.
#[derive(Clone, Debug)]
pub struct PostgresBackend {
    options: PgConnectOptions,
    connect_timeout: Duration,
}

impl PostgresBackend {
    pub fn new(options: PgConnectOptions, connect_timeout: Duration) -> Self {
        Self { options, connect_timeout }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(
            postgres_options(&config.postgres, statement_timeout(config)),
            connect_timeout(config),
        )
    }
}

#[async_trait]
impl SqlBackend for PostgresBackend {
    fn kind(&self) -> DatabaseBackend {
        DatabaseBackend::Postgres
    }

    async fn connect(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        let conn =
            with_connect_timeout(self.connect_timeout, PgConnection::connect_with(&self.options))
                .await?;
        debug!(event_name = "db.postgres.connected", "postgres connection opened");
        Ok(Box::new(PostgresSession { conn }))
    }
}

pub struct PostgresSession {
    conn: PgConnection,
}

#[async_trait]
impl BackendSession for PostgresSession {
    async fn execute(
        &mut self,
        statement: &str,
        params: &[NativeValue],
    ) -> Result<QueryOutput, BackendError> {
        let prepared = (&mut self.conn).prepare(statement).await.map_err(query_error)?;
        let columns =
            prepared.columns().iter().map(|column| column.name().to_string()).collect::<Vec<_>>();

        let mut query = sqlx::query(statement);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = query.fetch_all(&mut self.conn).await.map_err(query_error)?;

        let rows = rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>()?;
        Ok(QueryOutput { columns, rows })
    }

    async fn set_statement_limit(&mut self, limit: Duration) -> Result<(), BackendError> {
        let statement = format!("SET statement_timeout = {}", limit.as_millis());
        sqlx::query(&statement).execute(&mut self.conn).await.map_err(query_error)?;
        Ok(())
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, BackendError> {
        first_column_text(self.execute(LIST_TABLES_SQL, &[]).await?)
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, BackendError> {
        first_column_text(self.execute(LIST_COLUMNS_SQL, &[NativeValue::from(table)]).await?)
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.conn.close().await.map_err(|error| BackendError::Connect(error.to_string()))?;
        debug!(event_name = "db.postgres.closed", "postgres connection closed");
        Ok(())
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &'q NativeValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        NativeValue::Null => query.bind(Option::<String>::None),
        NativeValue::Bool(flag) => query.bind(*flag),
        NativeValue::Int(number) => query.bind(*number),
        NativeValue::Float(number) => query.bind(*number),
        NativeValue::Decimal(number) => query.bind(*number),
        NativeValue::Text(text) => query.bind(text.as_str()),
        NativeValue::Bytes(bytes) => query.bind(bytes.as_slice()),
        other => query.bind(askdb_core::normalize(other.clone()).to_string()),
    }
}

fn decode_row(row: &PgRow) -> Result<Vec<NativeValue>, BackendError> {
    (0..row.columns().len()).map(|index| decode_cell(row, index)).collect()
}

/// Decodes by the declared column type. Rows arrive in the binary protocol,
/// so a type without a mapping here is only readable when the server sent it
/// as text.
fn decode_cell(row: &PgRow, index: usize) -> Result<NativeValue, BackendError> {
    let column = &row.columns()[index];
    let decode_error = |error: sqlx::Error| BackendError::Decode {
        column: column.name().to_string(),
        message: error.to_string(),
    };

    let raw = row.try_get_raw(index).map_err(decode_error)?;
    if raw.is_null() {
        return Ok(NativeValue::Null);
    }

    let value = match column.type_info().name() {
        "BOOL" => NativeValue::Bool(row.try_get(index).map_err(decode_error)?),
        "INT2" => NativeValue::Int(i64::from(row.try_get::<i16, _>(index).map_err(decode_error)?)),
        "INT4" => NativeValue::Int(i64::from(row.try_get::<i32, _>(index).map_err(decode_error)?)),
        "INT8" => NativeValue::Int(row.try_get(index).map_err(decode_error)?),
        "OID" => NativeValue::Int(i64::from(row.try_get::<Oid, _>(index).map_err(decode_error)?.0)),
        "FLOAT4" => NativeValue::Float(f64::from(row.try_get::<f32, _>(index).map_err(decode_error)?)),
        "FLOAT8" => NativeValue::Float(row.try_get(index).map_err(decode_error)?),
        "NUMERIC" => NativeValue::Decimal(row.try_get::<Decimal, _>(index).map_err(decode_error)?),
        "MONEY" => NativeValue::Decimal(row.try_get::<PgMoney, _>(index).map_err(decode_error)?.to_decimal(2)),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
            NativeValue::Text(row.try_get(index).map_err(decode_error)?)
        }
        "BYTEA" => NativeValue::Bytes(row.try_get(index).map_err(decode_error)?),
        "DATE" => NativeValue::temporal(row.try_get::<NaiveDate, _>(index).map_err(decode_error)?),
        "TIME" => NativeValue::temporal(row.try_get::<NaiveTime, _>(index).map_err(decode_error)?),
        "TIMETZ" => {
            let value = row.try_get::<PgTimeTz<NaiveTime, FixedOffset>, _>(index).map_err(decode_error)?;
            NativeValue::Text(format!("{}{}", value.time.format("%H:%M:%S%.f"), value.offset))
        }
        "TIMESTAMP" => {
            NativeValue::temporal(row.try_get::<NaiveDateTime, _>(index).map_err(decode_error)?)
        }
        "TIMESTAMPTZ" => {
            NativeValue::temporal(row.try_get::<DateTime<Utc>, _>(index).map_err(decode_error)?)
        }
        "INTERVAL" => {
            NativeValue::Text(interval_text(&row.try_get::<PgInterval, _>(index).map_err(decode_error)?))
        }
        "JSON" | "JSONB" => {
            NativeValue::from(row.try_get::<serde_json::Value, _>(index).map_err(decode_error)?)
        }
        "UUID" => NativeValue::Text(
            row.try_get::<sqlx::types::Uuid, _>(index).map_err(decode_error)?.to_string(),
        ),
        "BOOL[]" => sequence::<bool>(row, index, NativeValue::Bool).map_err(decode_error)?,
        "INT2[]" => sequence::<i16>(row, index, |n| NativeValue::Int(n.into())).map_err(decode_error)?,
        "INT4[]" => sequence::<i32>(row, index, |n| NativeValue::Int(n.into())).map_err(decode_error)?,
        "INT8[]" => sequence::<i64>(row, index, NativeValue::Int).map_err(decode_error)?,
        "FLOAT4[]" => sequence::<f32>(row, index, |n| NativeValue::Float(n.into())).map_err(decode_error)?,
        "FLOAT8[]" => sequence::<f64>(row, index, NativeValue::Float).map_err(decode_error)?,
        "NUMERIC[]" => sequence::<Decimal>(row, index, NativeValue::Decimal).map_err(decode_error)?,
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            sequence::<String>(row, index, NativeValue::Text).map_err(decode_error)?
        }
        other => unmapped_cell(column.name(), other, raw.format(), raw.as_str().ok())?,
    };
    Ok(value)
}

/// One-dimensional arrays; NULL elements stay NULL.
fn sequence<T>(
    row: &PgRow,
    index: usize,
    convert: impl Fn(T) -> NativeValue,
) -> Result<NativeValue, sqlx::Error>
where
    T: for<'a> Decode<'a, Postgres> + Type<Postgres> + PgHasArrayType,
{
    let items: Vec<Option<T>> = row.try_get(index)?;
    Ok(NativeValue::Sequence(
        items.into_iter().map(|item| item.map_or(NativeValue::Null, &convert)).collect(),
    ))
}

fn unmapped_cell(
    column: &str,
    type_name: &str,
    format: PgValueFormat,
    text: Option<&str>,
) -> Result<NativeValue, BackendError> {
    match (format, text) {
        (PgValueFormat::Text, Some(text)) => Ok(NativeValue::Text(text.to_string())),
        _ => Err(BackendError::Decode {
            column: column.to_string(),
            message: format!("unsupported column type `{type_name}`"),
        }),
    }
}

/// ISO-8601 duration text, e.g. `P1Y2M3DT4H5M6.5S`.
fn interval_text(interval: &PgInterval) -> String {
    let mut text = String::from("P");
    let (years, months) = (interval.months / 12, interval.months % 12);
    for (amount, unit) in [(years, 'Y'), (months, 'M'), (interval.days, 'D')] {
        if amount != 0 {
            text.push_str(&format!("{amount}{unit}"));
        }
    }

    let micros = interval.microseconds;
    if micros != 0 {
        text.push('T');
        let hours = micros / 3_600_000_000;
        let minutes = micros % 3_600_000_000 / 60_000_000;
        let seconds = micros % 60_000_000;
        if hours != 0 {
            text.push_str(&format!("{hours}H"));
        }
        if minutes != 0 {
            text.push_str(&format!("{minutes}M"));
        }
        if seconds != 0 {
            text.push_str(&format!("{}S", seconds_text(seconds)));
        }
    }

    if text == "P" {
        text.push_str("T0S");
    }
    text
}

fn seconds_text(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    let micros = micros.unsigned_abs();
    let (whole, fraction) = (micros / 1_000_000, micros % 1_000_000);
    if fraction == 0 {
        format!("{sign}{whole}")
    } else {
        let fraction = format!("{fraction:06}");
        format!("{sign}{whole}.{}", fraction.trim_end_matches('0'))
    }
}
