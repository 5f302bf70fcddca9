pub mod connection;
pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use askdb_core::config::{DatabaseBackend, DatabaseConfig};
use askdb_core::{BackendError, SqlBackend};

pub use postgres::{PostgresBackend, PostgresSession};
pub use sqlite::{SqliteBackend, SqliteSession};

/// Selects the backend variant named by configuration. No connection is made
/// until the first call to [`SqlBackend::connect`].
pub fn open_backend(config: &DatabaseConfig) -> Result<Arc<dyn SqlBackend>, BackendError> {
    let backend: Arc<dyn SqlBackend> = match config.backend {
        DatabaseBackend::Sqlite => Arc::new(SqliteBackend::from_config(config)?),
        DatabaseBackend::Postgres => Arc::new(PostgresBackend::from_config(config)),
    };
    tracing::info!(
        event_name = "db.backend.selected",
        backend = config.backend.as_str(),
        "database backend selected"
    );
    Ok(backend)
}
