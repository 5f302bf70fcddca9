use std::time::Duration;

use async_trait::async_trait;

use crate::config::DatabaseBackend;
use crate::errors::BackendError;
use crate::value::NativeValue;

/// Column names and raw rows produced by one statement. A statement without a
/// describable result set yields empty columns and rows.
#[derive(Clone, Debug, Default)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<NativeValue>>,
}

/// One database variant, selected once from configuration. Each call to
/// [`SqlBackend::connect`] opens a fresh, unpooled connection.
#[async_trait]
pub trait SqlBackend: Send + Sync {
    fn kind(&self) -> DatabaseBackend;

    async fn connect(&self) -> Result<Box<dyn BackendSession>, BackendError>;
}

/// A live connection. Callers must [`BackendSession::close`] it on every exit
/// path; dropping without closing still releases the socket or file handle.
#[async_trait]
pub trait BackendSession: Send {
    /// Asks the engine to abort any later statement on this session that runs
    /// longer than `limit`. Engines that cannot interrupt work ignore it.
    async fn set_statement_limit(&mut self, limit: Duration) -> Result<(), BackendError> {
        let _ = limit;
        Ok(())
    }

    /// Runs one statement with positional parameters bound in the backend's
    /// own placeholder syntax.
    async fn execute(
        &mut self,
        statement: &str,
        params: &[NativeValue],
    ) -> Result<QueryOutput, BackendError>;

    /// Base tables of the default namespace, system tables excluded.
    async fn list_tables(&mut self) -> Result<Vec<String>, BackendError>;

    /// Column names of `table` in catalog-declared ordinal order.
    async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, BackendError>;

    async fn close(self: Box<Self>) -> Result<(), BackendError>;
}
