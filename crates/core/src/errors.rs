use std::time::Duration;

use thiserror::Error;

/// Failures raised by a backend variant while connecting, introspecting, or
/// executing a statement.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Query(String),
    #[error("could not decode column `{column}`: {message}")]
    Decode { column: String, message: String },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Stage-local pipeline failures. None of these escape the orchestrator; each
/// one is rendered into the response field owned by the failing stage.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Schema unavailable: {0}")]
    CatalogUnavailable(String),
    #[error("{stage} error: {message}")]
    GenerationFailed { stage: AgentStage, message: String },
    #[error("SQL generation returned empty result.")]
    SanitizationEmpty,
    #[error("Only SELECT/WITH allowed for safety.")]
    StatementRejected,
    #[error("SQL execution error: {0}")]
    ExecutionError(String),
    #[error("Synthesizer error: {0}")]
    SynthesisFailed(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentStage {
    Schema,
    SqlGenerator,
    Synthesizer,
}

impl std::fmt::Display for AgentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Schema => "Schema agent",
            Self::SqlGenerator => "SQL generator",
            Self::Synthesizer => "Synthesizer",
        };
        f.write_str(label)
    }
}

impl From<BackendError> for PipelineError {
    fn from(value: BackendError) -> Self {
        Self::ExecutionError(value.to_string())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl BackendError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let message = self.to_string();
        match self {
            Self::Connect(_) | Self::Timeout(_) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Query(_) | Self::Decode { .. } => {
                InterfaceError::Internal { message, correlation_id }
            }
        }
    }
}
