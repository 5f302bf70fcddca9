use std::time::{Duration, Instant};

use askdb_core::config::{DatabaseBackend, DatabaseConfig};
use askdb_core::{BackendError, BackendSession, NativeValue, QueryOutput, SqlBackend};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteRow};
use sqlx::{Column, Connection, Executor, Row, Sqlite, SqliteConnection, Statement, TypeInfo, ValueRef};
use tracing::debug;

use crate::connection::{
    connect_timeout, query_error, sqlite_options, statement_timeout, with_connect_timeout,
};

const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'";
const LIST_COLUMNS_SQL: &str = "SELECT name FROM pragma_table_info(?1) ORDER BY cid";
/// Virtual machine steps between deadline checks while a statement runs.
const PROGRESS_STEPS: i32 = 1_000;

/// Embedded, file-based backend.
#[derive(Clone, Debug)]
pub struct SqliteBackend {
    options: SqliteConnectOptions,
    connect_timeout: Duration,
}

impl SqliteBackend {
    pub fn new(options: SqliteConnectOptions, connect_timeout: Duration) -> Self {
        Self { options, connect_timeout }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, BackendError> {
        let options = sqlite_options(&config.sqlite_path, statement_timeout(config))?;
        Ok(Self::new(options, connect_timeout(config)))
    }
}

#[async_trait]
impl SqlBackend for SqliteBackend {
    fn kind(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn connect(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        let conn = with_connect_timeout(
            self.connect_timeout,
            SqliteConnection::connect_with(&self.options),
        )
        .await?;
        debug!(event_name = "db.sqlite.connected", "sqlite connection opened");
        Ok(Box::new(SqliteSession { conn, statement_limit: None }))
    }
}

pub struct SqliteSession {
    conn: SqliteConnection,
    statement_limit: Option<Duration>,
}

impl SqliteSession {
    /// The driver runs statements on a worker thread that keeps going after
    /// the awaiting future is dropped, so the deadline is enforced inside the
    /// engine through a progress handler.
    async fn arm_deadline(&mut self, limit: Duration) -> Result<Instant, BackendError> {
        let deadline = Instant::now() + limit;
        let mut handle = self.conn.lock_handle().await.map_err(query_error)?;
        handle.set_progress_handler(PROGRESS_STEPS, move || Instant::now() < deadline);
        Ok(deadline)
    }

    async fn disarm_deadline(&mut self) {
        if let Ok(mut handle) = self.conn.lock_handle().await {
            handle.remove_progress_handler();
        }
    }

    async fn run(
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
}

#[async_trait]
impl BackendSession for SqliteSession {
    async fn set_statement_limit(&mut self, limit: Duration) -> Result<(), BackendError> {
        self.statement_limit = Some(limit);
        Ok(())
    }

    async fn execute(
        &mut self,
        statement: &str,
        params: &[NativeValue],
    ) -> Result<QueryOutput, BackendError> {
        let Some(limit) = self.statement_limit else {
            return self.run(statement, params).await;
        };

        let deadline = self.arm_deadline(limit).await?;
        let outcome = self.run(statement, params).await;
        self.disarm_deadline().await;

        match outcome {
            Err(_) if Instant::now() >= deadline => Err(BackendError::Timeout(limit)),
            other => other,
        }
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, BackendError> {
        first_column_text(self.execute(LIST_TABLES_SQL, &[]).await?)
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, BackendError> {
        first_column_text(self.execute(LIST_COLUMNS_SQL, &[NativeValue::from(table)]).await?)
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.conn.close().await.map_err(|error| BackendError::Connect(error.to_string()))?;
        debug!(event_name = "db.sqlite.closed", "sqlite connection closed");
        Ok(())
    }
}

pub(crate) fn first_column_text(output: QueryOutput) -> Result<Vec<String>, BackendError> {
    output
        .rows
        .into_iter()
        .map(|row| match row.into_iter().next() {
            Some(NativeValue::Text(name)) => Ok(name),
            other => Err(BackendError::Decode {
                column: "name".to_string(),
                message: format!("expected catalog text, found {other:?}"),
            }),
        })
        .collect()
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &'q NativeValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        NativeValue::Null => query.bind(Option::<String>::None),
        NativeValue::Bool(flag) => query.bind(*flag),
        NativeValue::Int(number) => query.bind(*number),
        NativeValue::Float(number) => query.bind(*number),
        NativeValue::Text(text) => query.bind(text.as_str()),
        NativeValue::Bytes(bytes) => query.bind(bytes.as_slice()),
        other => query.bind(askdb_core::normalize(other.clone()).to_string()),
    }
}

/// SQLite is dynamically typed, so cells are decoded by the storage class of
/// each value rather than the declared column type.
fn decode_row(row: &SqliteRow) -> Result<Vec<NativeValue>, BackendError> {
    (0..row.columns().len()).map(|index| decode_cell(row, index)).collect()
}

fn decode_cell(row: &SqliteRow, index: usize) -> Result<NativeValue, BackendError> {
    let column = row.columns()[index].name().to_string();
    let decode_error = |error: sqlx::Error| BackendError::Decode {
        column: column.clone(),
        message: error.to_string(),
    };

    let raw = row.try_get_raw(index).map_err(decode_error)?;
    if raw.is_null() {
        return Ok(NativeValue::Null);
    }
    let storage_class = raw.type_info().name().to_ascii_uppercase();

    let value = match storage_class.as_str() {
        "INTEGER" | "INT" | "BIGINT" => NativeValue::Int(row.try_get_unchecked(index).map_err(decode_error)?),
        "BOOLEAN" => NativeValue::Bool(row.try_get_unchecked(index).map_err(decode_error)?),
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
            NativeValue::Float(row.try_get_unchecked(index).map_err(decode_error)?)
        }
        "BLOB" => NativeValue::Bytes(row.try_get_unchecked(index).map_err(decode_error)?),
        _ => NativeValue::Text(row.try_get_unchecked(index).map_err(decode_error)?),
    };
    Ok(value)
}
