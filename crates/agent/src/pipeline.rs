use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use askdb_core::config::AppConfig;
use askdb_core::{
    clean_sql, AgentStage, AskResponse, PipelineError, PipelineResult, QueryResult, SqlBackend,
};
use tracing::{debug, info, warn};

use crate::executor::run_statements;
use crate::introspect::describe_schema;
use crate::llm::{call_budget, LlmClient};
use crate::prompts::{schema_prompt, sql_prompt, synthesis_prompt};

pub const NO_SQL_ANSWER: &str = "I couldn't generate a SQL query for that question. Try rephrasing.";

/// Bounded waits applied inside one pipeline run. `llm_timeout` bounds a
/// whole collaborator call, retries included.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub llm_timeout: Duration,
    pub statement_timeout: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            llm_timeout: call_budget(&config.llm),
            statement_timeout: Duration::from_secs(config.database.statement_timeout_secs.max(1)),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// Question-to-answer orchestrator. Holds no per-request state, so one
/// instance serves concurrent questions.
#[derive(Clone)]
pub struct Pipeline {
    llm: Arc<dyn LlmClient>,
    backend: Arc<dyn SqlBackend>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn LlmClient>, backend: Arc<dyn SqlBackend>, settings: PipelineSettings) -> Self {
        Self { llm, backend, settings }
    }

    pub fn backend(&self) -> &Arc<dyn SqlBackend> {
        &self.backend
    }

    /// Answers one question. Stage failures are folded into the response;
    /// this never returns an error.
    pub async fn ask(&self, question: &str) -> AskResponse {
        let question = question.trim();
        if question.is_empty() {
            debug!(event_name = "pipeline.question.empty", "rejected empty question");
            return AskResponse::empty_question();
        }

        let started = Instant::now();
        info!(event_name = "pipeline.question.received", question_chars = question.chars().count(), "question received");

        let schema_text = match describe_schema(self.backend.as_ref()).await {
            Ok(description) => description.to_string(),
            Err(error) => {
                warn!(event_name = "pipeline.schema.unavailable", error = %error, "schema introspection failed");
                error.to_string()
            }
        };

        let schema_agent_text = self
            .generate(AgentStage::Schema, &schema_prompt(&schema_text, question))
            .await
            .unwrap_or_else(|error| error.to_string());

        let dialect = self.backend.kind();
        let raw_sql = match self.generate(AgentStage::SqlGenerator, &sql_prompt(dialect, &schema_text, question)).await {
            Ok(raw_sql) => raw_sql,
            Err(error) => {
                return no_sql(schema_agent_text, error.to_string(), String::new());
            }
        };

        let sql_query = clean_sql(&raw_sql);
        if sql_query.is_empty() {
            warn!(event_name = "pipeline.sql.empty", raw_chars = raw_sql.len(), "no SQL left after sanitizing");
            return no_sql(schema_agent_text, PipelineError::SanitizationEmpty.to_string(), raw_sql);
        }
        debug!(event_name = "pipeline.sql.sanitized", dialect = dialect.as_str(), "SQL sanitized");

        let query_result = run_statements(self.backend.as_ref(), &sql_query, self.settings.statement_timeout).await;
        debug!(event_name = "pipeline.sql.executed", has_error = query_result.has_error(), "statements executed");

        let result_json = serde_json::to_string(&query_result)
            .unwrap_or_else(|error| serde_json::json!({ "error": error.to_string() }).to_string());
        let final_answer = match self
            .generate(AgentStage::Synthesizer, &synthesis_prompt(question, &sql_query, &result_json))
            .await
        {
            Ok(answer) => answer,
            Err(PipelineError::GenerationFailed { message, .. }) => PipelineError::SynthesisFailed(message).to_string(),
            Err(other) => other.to_string(),
        };

        info!(
            event_name = "pipeline.question.answered",
            elapsed_ms = started.elapsed().as_millis() as u64,
            has_error = query_result.has_error(),
            "question answered"
        );

        AskResponse::Answered(PipelineResult {
            schema_agent_text: schema_agent_text.trim().to_string(),
            sql_query: sql_query.trim().to_string(),
            query_result,
            final_answer: final_answer.trim().to_string(),
        })
    }

    async fn generate(&self, stage: AgentStage, prompt: &str) -> Result<String, PipelineError> {
        debug!(event_name = "pipeline.llm.request", stage = %stage, "calling text generation");
        bounded(self.settings.llm_timeout, self.llm.complete(prompt)).await.map_err(|message| {
            warn!(event_name = "pipeline.llm.failed", stage = %stage, error = %message, "text generation failed");
            PipelineError::GenerationFailed { stage, message }
        })
    }
}

async fn bounded<F>(limit: Duration, call: F) -> Result<String, String>
where
    F: Future<Output = anyhow::Result<String>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(error)) => Err(error.to_string()),
        Err(_) => Err(format!("timed out after {limit:?}")),
    }
}

fn no_sql(schema_agent_text: String, error: String, raw_sql: String) -> AskResponse {
    AskResponse::Answered(PipelineResult {
        schema_agent_text: schema_agent_text.trim().to_string(),
        sql_query: String::new(),
        query_result: QueryResult::Failed { error, raw_sql: Some(raw_sql) },
        final_answer: NO_SQL_ANSWER.to_string(),
    })
}
