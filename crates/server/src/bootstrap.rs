use askdb_agent::{client_from_config, Pipeline, PipelineSettings};
use askdb_core::config::{AppConfig, ConfigError};
use askdb_core::BackendError;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub pipeline: Pipeline,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database backend setup failed: {0}")]
    Backend(#[source] BackendError),
    #[error("LLM client setup failed: {0}")]
    Llm(String),
}

/// Wires the backend and collaborator selected by `config` into a pipeline.
/// No connection is opened here; the database is first touched per request.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", correlation_id = "bootstrap", "starting application bootstrap");

    let backend = askdb_db::open_backend(&config.database).map_err(BootstrapError::Backend)?;
    let llm = client_from_config(&config.llm).map_err(|error| BootstrapError::Llm(error.to_string()))?;
    let pipeline = Pipeline::new(llm, backend, PipelineSettings::from_config(&config));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        backend = config.database.backend.as_str(),
        llm_provider = config.llm.provider.as_str(),
        "application bootstrap complete"
    );

    Ok(Application { config, pipeline })
}

#[cfg(test)]
mod tests {
    use askdb_core::config::{AppConfig, ConfigOverrides, DatabaseBackend, LlmProvider, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn load(overrides: ConfigOverrides) -> Result<AppConfig, BootstrapError> {
        Ok(AppConfig::load(LoadOptions { overrides, ..LoadOptions::default() })?)
    }

    #[test]
    fn bootstrap_selects_configured_backend_without_connecting() {
        let config = load(ConfigOverrides {
            database_backend: Some(DatabaseBackend::Postgres),
            llm_provider: Some(LlmProvider::OpenAi),
            ..ConfigOverrides::default()
        })
        .expect("config should load");

        let app = bootstrap_with_config(config).expect("bootstrap should not need a live database");

        assert_eq!(app.pipeline.backend().kind(), DatabaseBackend::Postgres);
        assert_eq!(app.config.llm.provider, LlmProvider::OpenAi);
    }

    #[test]
    fn invalid_config_surfaces_as_config_error() {
        let result = load(ConfigOverrides { sqlite_path: Some("   ".to_string()), ..ConfigOverrides::default() });

        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }
}
