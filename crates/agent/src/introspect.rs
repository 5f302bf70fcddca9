use askdb_core::{BackendError, PipelineError, SchemaDescription, SqlBackend};
use tracing::warn;

/// Reads the live catalog through one short-lived session. The session is
/// closed whether or not introspection succeeds.
pub async fn describe_schema(backend: &dyn SqlBackend) -> Result<SchemaDescription, PipelineError> {
    let mut session = backend.connect().await.map_err(catalog_unavailable)?;

    let described = async {
        let mut description = SchemaDescription::default();
        for table in session.list_tables().await? {
            let columns = session.list_columns(&table).await?;
            description.push(table, columns);
        }
        Ok::<_, BackendError>(description)
    }
    .await;

    if let Err(error) = session.close().await {
        warn!(event_name = "schema.session.close_failed", error = %error, "failed to close catalog session");
    }

    described.map_err(catalog_unavailable)
}

fn catalog_unavailable(error: BackendError) -> PipelineError {
    PipelineError::CatalogUnavailable(error.to_string())
}

#[cfg(test)]
mod tests {
    use askdb_core::{BackendError, PipelineError};

    use super::describe_schema;
    use crate::testing::FakeBackend;

    #[tokio::test]
    async fn describes_tables_in_catalog_order() {
        let backend = FakeBackend::new()
            .with_table("customers", &["id", "name", "city", "join_date"])
            .with_table("orders", &["id", "customer_id", "amount"]);

        let description = describe_schema(&backend).await.expect("catalog should be readable");

        assert_eq!(
            description.to_string(),
            "Tables:\ncustomers(id, name, city, join_date)\norders(id, customer_id, amount)"
        );
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test]
    async fn connect_failure_is_catalog_unavailable() {
        let backend = FakeBackend::new().failing_connect(BackendError::Connect("refused".into()));

        let error = describe_schema(&backend).await.expect_err("connect must fail");
        assert_eq!(error, PipelineError::CatalogUnavailable("connection failed: refused".into()));
        assert_eq!(error.to_string(), "Schema unavailable: connection failed: refused");
    }

    #[tokio::test]
    async fn session_is_closed_after_catalog_error() {
        let backend = FakeBackend::new()
            .with_table("customers", &["id"])
            .failing_catalog(BackendError::Query("permission denied".into()));

        let error = describe_schema(&backend).await.expect_err("catalog must fail");
        assert_eq!(error.to_string(), "Schema unavailable: permission denied");
        assert_eq!(backend.open_sessions(), 0);
    }
}
