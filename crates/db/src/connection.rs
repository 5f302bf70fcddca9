use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use askdb_core::config::{DatabaseConfig, PostgresConfig};
use askdb_core::BackendError;
use secrecy::ExposeSecret;
use sqlx::postgres::PgConnectOptions;
use sqlx::sqlite::SqliteConnectOptions;

/// Connection options for the embedded engine. File databases are opened
/// read-only and must already exist; `:memory:` opens a private scratch
/// database.
pub fn sqlite_options(
    path: &str,
    busy_timeout: Duration,
) -> Result<SqliteConnectOptions, BackendError> {
    let trimmed = path.trim();
    let options = if trimmed.eq_ignore_ascii_case(":memory:") {
        SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|error| BackendError::Connect(error.to_string()))?
    } else {
        SqliteConnectOptions::new().filename(trimmed).create_if_missing(false).read_only(true)
    };

    Ok(options.busy_timeout(busy_timeout))
}

/// Connection options for the client-server engine. Sessions start with
/// read-only transactions and a server-side statement timeout.
pub fn postgres_options(config: &PostgresConfig, statement_timeout: Duration) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .application_name("askdb");

    let password = config.password.expose_secret();
    if !password.is_empty() {
        options = options.password(password);
    }

    options.options([
        ("default_transaction_read_only", "on".to_string()),
        ("statement_timeout", statement_timeout.as_millis().to_string()),
    ])
}

pub fn connect_timeout(config: &DatabaseConfig) -> Duration {
    Duration::from_secs(config.connect_timeout_secs.max(1))
}

pub fn statement_timeout(config: &DatabaseConfig) -> Duration {
    Duration::from_secs(config.statement_timeout_secs.max(1))
}

/// Bounds a connection attempt, mapping both driver errors and expiry into
/// [`BackendError`].
pub async fn with_connect_timeout<T, F>(limit: Duration, attempt: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, attempt).await {
        Ok(Ok(connection)) => Ok(connection),
        Ok(Err(error)) => Err(BackendError::Connect(error.to_string())),
        Err(_) => Err(BackendError::Timeout(limit)),
    }
}

pub(crate) fn query_error(error: sqlx::Error) -> BackendError {
    match error {
        sqlx::Error::Database(database_error) => {
            BackendError::Query(database_error.message().to_string())
        }
        other => BackendError::Query(other.to_string()),
    }
}
