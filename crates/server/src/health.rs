use std::sync::Arc;

use askdb_core::{BackendError, SqlBackend};
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct HealthState {
    backend: Arc<dyn SqlBackend>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

pub fn router(backend: Arc<dyn SqlBackend>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { backend })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(state.backend.as_ref()).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "askdb-server runtime initialized".to_string() },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(backend: &dyn SqlBackend) -> HealthCheck {
    match probe(backend).await {
        Ok(()) => HealthCheck {
            status: "ready",
            detail: format!("{} database query succeeded", backend.kind().as_str()),
        },
        Err(error) => {
            let error = error.into_interface(Uuid::new_v4().to_string());
            warn!(
                event_name = "system.health.degraded",
                correlation_id = error.correlation_id(),
                error = %error,
                "database health probe failed"
            );
            HealthCheck { status: "degraded", detail: error.to_string() }
        }
    }
}

async fn probe(backend: &dyn SqlBackend) -> Result<(), BackendError> {
    let mut session = backend.connect().await?;
    let result = session.execute("SELECT 1", &[]).await;
    session.close().await?;
    result.map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use askdb_core::config::AppConfig;
    use axum::{extract::State, http::StatusCode, Json};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let mut config = AppConfig::default().database;
        config.sqlite_path = ":memory:".to_string();
        let backend = askdb_db::open_backend(&config).expect("backend should build");

        let (status, Json(payload)) = health(State(HealthState { backend: Arc::clone(&backend) })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default().database;
        config.sqlite_path = dir.path().join("missing.db").to_string_lossy().into_owned();
        let backend = askdb_db::open_backend(&config).expect("backend should build");

        let (status, Json(payload)) = health(State(HealthState { backend })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert!(payload.database.detail.starts_with("service unavailable: connection failed"));
        assert_eq!(payload.service.status, "ready");
    }
}
