use serde::{Serialize, Serializer};
use serde_json::Value;

pub const EMPTY_QUESTION: &str = "Empty question.";

#[derive(Clone, Debug, PartialEq)]
pub enum StatementResult {
    Executed { columns: Vec<String>, rows: Vec<Vec<Value>> },
    Rejected { reason: String },
    ExecutionError { message: String },
}

/// A statement result tagged with the statement text it was produced from.
#[derive(Clone, Debug, PartialEq)]
pub struct StatementOutcome {
    pub query: String,
    pub result: StatementResult,
}

impl StatementOutcome {
    pub fn is_executed(&self) -> bool {
        matches!(self.result, StatementResult::Executed { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.result {
            StatementResult::Executed { .. } => None,
            StatementResult::Rejected { reason } => Some(reason),
            StatementResult::ExecutionError { message } => Some(message),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum StatementReport<'a> {
    Executed { query: &'a str, columns: &'a [String], rows: &'a [Vec<Value>] },
    Failed { query: &'a str, error: &'a str },
}

impl Serialize for StatementOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let report = match &self.result {
            StatementResult::Executed { columns, rows } => {
                StatementReport::Executed { query: &self.query, columns, rows }
            }
            StatementResult::Rejected { reason: error }
            | StatementResult::ExecutionError { message: error } => {
                StatementReport::Failed { query: &self.query, error }
            }
        };
        report.serialize(serializer)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum QueryResult {
    Statements {
        multi_results: Vec<StatementOutcome>,
    },
    Failed {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw_sql: Option<String>,
    },
}

impl QueryResult {
    pub fn has_error(&self) -> bool {
        match self {
            Self::Statements { multi_results } => {
                multi_results.iter().any(|outcome| outcome.error().is_some())
            }
            Self::Failed { .. } => true,
        }
    }
}

/// Aggregate of one pipeline run. Every field always carries a value; stage
/// failures are substituted as descriptive text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineResult {
    #[serde(rename = "schema_agent_output")]
    pub schema_agent_text: String,
    pub sql_query: String,
    pub query_result: QueryResult,
    pub final_answer: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AskResponse {
    Answered(PipelineResult),
    Error { error: String },
}

impl AskResponse {
    pub fn empty_question() -> Self {
        Self::Error { error: EMPTY_QUESTION.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{AskResponse, PipelineResult, QueryResult, StatementOutcome, StatementResult};

    #[test]
    fn statement_outcomes_serialize_to_wire_shape() {
        let result = QueryResult::Statements {
            multi_results: vec![
                StatementOutcome {
                    query: "SELECT COUNT(*) FROM customers".into(),
                    result: StatementResult::Executed {
                        columns: vec!["COUNT(*)".into()],
                        rows: vec![vec![json!(12)]],
                    },
                },
                StatementOutcome {
                    query: "DELETE FROM customers".into(),
                    result: StatementResult::Rejected {
                        reason: "Only SELECT/WITH allowed for safety.".into(),
                    },
                },
            ],
        };

        assert_eq!(
            serde_json::to_value(&result).ok(),
            Some(json!({
                "multi_results": [
                    {"query": "SELECT COUNT(*) FROM customers", "columns": ["COUNT(*)"], "rows": [[12]]},
                    {"query": "DELETE FROM customers", "error": "Only SELECT/WITH allowed for safety."}
                ]
            }))
        );
        assert!(result.has_error());
    }

    #[test]
    fn failed_query_result_includes_raw_sql_only_when_present() {
        let with_raw = QueryResult::Failed {
            error: "SQL generation returned empty result.".into(),
            raw_sql: Some("```\n```".into()),
        };
        let without_raw = QueryResult::Failed { error: "boom".into(), raw_sql: None };

        assert_eq!(
            serde_json::to_value(&with_raw).ok(),
            Some(json!({"error": "SQL generation returned empty result.", "raw_sql": "```\n```"}))
        );
        assert_eq!(serde_json::to_value(&without_raw).ok(), Some(json!({"error": "boom"})));
    }

    #[test]
    fn ask_response_uses_flat_field_names() {
        let answered = AskResponse::Answered(PipelineResult {
            schema_agent_text: "Relevant Tables:\n - customers".into(),
            sql_query: "SELECT 1".into(),
            query_result: QueryResult::Statements { multi_results: vec![] },
            final_answer: "One.".into(),
        });

        let value = serde_json::to_value(&answered).unwrap_or_default();
        assert_eq!(value["schema_agent_output"], "Relevant Tables:\n - customers");
        assert_eq!(value["query_result"], json!({"multi_results": []}));
        assert_eq!(
            serde_json::to_value(AskResponse::empty_question()).ok(),
            Some(json!({"error": "Empty question."}))
        );
    }
}
