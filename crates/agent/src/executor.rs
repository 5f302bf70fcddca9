use std::time::Duration;

use askdb_core::guard::is_read_only;
use askdb_core::value::normalize_row;
use askdb_core::{
    split_statements, BackendError, BackendSession, PipelineError, QueryOutput, QueryResult,
    SqlBackend, StatementOutcome, StatementResult,
};
use tracing::{debug, warn};

/// Runs every statement of a generated batch, in order.
///
/// Non-read statements are rejected individually and never reach the
/// backend. A failing read statement yields an error entry for that statement
/// only. A session whose statement timed out is abandoned and the next read
/// statement gets a fresh one. A batch fails as a whole only when the first
/// session cannot be opened.
pub async fn run_statements(
    backend: &dyn SqlBackend,
    batch: &str,
    statement_timeout: Duration,
) -> QueryResult {
    let statements = split_statements(batch);
    let mut session: Option<Box<dyn BackendSession>> = None;
    let mut opened_any = false;
    let mut multi_results = Vec::with_capacity(statements.len());

    for statement in statements {
        if !is_read_only(&statement) {
            debug!(event_name = "executor.statement.rejected", "non-read statement rejected");
            multi_results.push(StatementOutcome {
                query: statement,
                result: StatementResult::Rejected {
                    reason: PipelineError::StatementRejected.to_string(),
                },
            });
            continue;
        }

        let mut active = match session.take() {
            Some(active) => active,
            None => match open_session(backend, statement_timeout).await {
                Ok(opened) => opened,
                Err(error) if !opened_any => {
                    warn!(event_name = "executor.connect.failed", error = %error, "backend unavailable");
                    return QueryResult::Failed {
                        error: PipelineError::from(error).to_string(),
                        raw_sql: None,
                    };
                }
                Err(error) => {
                    warn!(event_name = "executor.reconnect.failed", error = %error, "backend unavailable");
                    multi_results.push(StatementOutcome {
                        query: statement,
                        result: StatementResult::ExecutionError {
                            message: PipelineError::from(error).to_string(),
                        },
                    });
                    continue;
                }
            },
        };
        opened_any = true;

        let outcome = execute_one(active.as_mut(), &statement, statement_timeout).await;
        if matches!(outcome, Err(BackendError::Timeout(_))) {
            abandon(active, statement_timeout);
        } else {
            session = Some(active);
        }
        multi_results.push(StatementOutcome { query: statement, result: into_result(outcome) });
    }

    if let Some(active) = session {
        close(active, statement_timeout).await;
    }
    QueryResult::Statements { multi_results }
}

async fn open_session(
    backend: &dyn SqlBackend,
    statement_timeout: Duration,
) -> Result<Box<dyn BackendSession>, BackendError> {
    let mut session = backend.connect().await?;
    if let Err(error) = session.set_statement_limit(statement_timeout).await {
        close(session, statement_timeout).await;
        return Err(error);
    }
    Ok(session)
}

async fn execute_one(
    session: &mut dyn BackendSession,
    statement: &str,
    statement_timeout: Duration,
) -> Result<QueryOutput, BackendError> {
    match tokio::time::timeout(statement_timeout, session.execute(statement, &[])).await {
        Ok(outcome) => outcome,
        Err(_) => Err(BackendError::Timeout(statement_timeout)),
    }
}

fn into_result(outcome: Result<QueryOutput, BackendError>) -> StatementResult {
    match outcome {
        Ok(output) => StatementResult::Executed {
            columns: output.columns,
            rows: output.rows.into_iter().map(normalize_row).collect(),
        },
        Err(error) => {
            warn!(event_name = "executor.statement.failed", error = %error, "statement failed");
            StatementResult::ExecutionError { message: PipelineError::from(error).to_string() }
        }
    }
}

/// A timed-out session may still be busy inside the engine; it is closed off
/// the request path.
fn abandon(session: Box<dyn BackendSession>, limit: Duration) {
    debug!(event_name = "executor.session.abandoned", "session abandoned after timeout");
    tokio::spawn(close(session, limit));
}

async fn close(session: Box<dyn BackendSession>, limit: Duration) {
    match tokio::time::timeout(limit, session.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            warn!(event_name = "executor.session.close_failed", error = %error, "failed to close session");
        }
        Err(_) => {
            warn!(event_name = "executor.session.close_timeout", limit_ms = limit.as_millis() as u64, "session close timed out");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use askdb_core::{BackendError, NativeValue, QueryResult, StatementResult};
    use serde_json::json;

    use super::run_statements;
    use crate::testing::FakeBackend;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn outcomes(result: QueryResult) -> Vec<(String, StatementResult)> {
        match result {
            QueryResult::Statements { multi_results } => {
                multi_results.into_iter().map(|outcome| (outcome.query, outcome.result)).collect()
            }
            QueryResult::Failed { error, .. } => panic!("batch failed: {error}"),
        }
    }

    #[tokio::test]
    async fn one_result_per_fragment_in_order() {
        let backend = FakeBackend::new()
            .with_result("SELECT 1", &["1"], vec![vec![NativeValue::Int(1)]])
            .with_result("with t as (select 2) select * from t", &["2"], vec![vec![NativeValue::Int(2)]]);

        let results =
            outcomes(run_statements(&backend, " SELECT 1;;\n with t as (select 2) select * from t ; ", TIMEOUT).await);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "SELECT 1");
        assert_eq!(results[1].0, "with t as (select 2) select * from t");
        assert!(results.iter().all(|(_, result)| matches!(result, StatementResult::Executed { .. })));
        assert_eq!(backend.connects(), 1);
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test]
    async fn write_statements_are_rejected_without_reaching_the_backend() {
        let backend = FakeBackend::new().with_result("SELECT 1", &["1"], vec![]);

        let results = outcomes(
            run_statements(&backend, "DELETE FROM customers; SELECT 1;\n  drop table orders", TIMEOUT).await,
        );

        let rejected = StatementResult::Rejected { reason: "Only SELECT/WITH allowed for safety.".into() };
        assert_eq!(results[0], ("DELETE FROM customers".to_string(), rejected.clone()));
        assert_eq!(results[2], ("drop table orders".to_string(), rejected));
        assert_eq!(backend.executed(), vec!["SELECT 1".to_string()]);
    }

    #[tokio::test]
    async fn all_rejected_batch_never_connects() {
        let backend = FakeBackend::new();

        let results = outcomes(run_statements(&backend, "UPDATE customers SET name = 'x'", TIMEOUT).await);

        assert_eq!(results.len(), 1);
        assert_eq!(backend.connects(), 0);
    }

    #[tokio::test]
    async fn failing_statement_does_not_stop_its_siblings() {
        let backend = FakeBackend::new()
            .with_result(
                "SELECT COUNT(*) FROM customers",
                &["COUNT(*)"],
                vec![vec![NativeValue::Int(12)]],
            )
            .with_error("SELECT * FROM invoices", BackendError::Query("no such table: invoices".into()));

        let results = outcomes(
            run_statements(&backend, "SELECT * FROM invoices; SELECT COUNT(*) FROM customers", TIMEOUT).await,
        );

        assert_eq!(
            results[0].1,
            StatementResult::ExecutionError { message: "SQL execution error: no such table: invoices".into() }
        );
        assert_eq!(
            results[1].1,
            StatementResult::Executed { columns: vec!["COUNT(*)".into()], rows: vec![vec![json!(12)]] }
        );
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test]
    async fn rows_are_normalized() {
        let backend = FakeBackend::new().with_result(
            "SELECT total, receipt FROM orders",
            &["total", "receipt"],
            vec![vec![NativeValue::Decimal("10.50".parse().unwrap_or_default()), NativeValue::Bytes(b"abc".to_vec())]],
        );

        let results = outcomes(run_statements(&backend, "SELECT total, receipt FROM orders", TIMEOUT).await);

        assert_eq!(
            results[0].1,
            StatementResult::Executed {
                columns: vec!["total".into(), "receipt".into()],
                rows: vec![vec![json!(10.5), json!("abc")]],
            }
        );
    }

    #[tokio::test]
    async fn slow_statement_times_out_as_execution_error() {
        let backend = FakeBackend::new()
            .with_result("SELECT pg_sleep(10)", &["pg_sleep"], vec![])
            .with_delay("SELECT pg_sleep(10)", Duration::from_secs(60));

        let results =
            outcomes(run_statements(&backend, "SELECT pg_sleep(10)", Duration::from_millis(20)).await);

        assert_eq!(
            results[0].1,
            StatementResult::ExecutionError { message: "SQL execution error: timed out after 20ms".into() }
        );
        backend.settle().await;
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test]
    async fn statement_after_a_timeout_runs_on_a_fresh_session() {
        let limit = Duration::from_millis(20);
        let backend = FakeBackend::new()
            .with_result("SELECT pg_sleep(10)", &["pg_sleep"], vec![])
            .with_delay("SELECT pg_sleep(10)", Duration::from_secs(60))
            .with_result("SELECT 1", &["1"], vec![vec![NativeValue::Int(1)]]);

        let results = outcomes(run_statements(&backend, "SELECT pg_sleep(10); SELECT 1", limit).await);

        assert!(matches!(results[0].1, StatementResult::ExecutionError { .. }));
        assert_eq!(
            results[1].1,
            StatementResult::Executed { columns: vec!["1".into()], rows: vec![vec![json!(1)]] }
        );
        assert_eq!(backend.connects(), 2);
        assert_eq!(backend.statement_limits(), vec![limit, limit]);
        backend.settle().await;
        assert_eq!(backend.open_sessions(), 0);
    }

    #[tokio::test]
    async fn reconnect_failure_only_fails_the_affected_statement() {
        let backend = FakeBackend::new()
            .with_result("SELECT pg_sleep(10)", &["pg_sleep"], vec![])
            .with_delay("SELECT pg_sleep(10)", Duration::from_secs(60))
            .failing_connect_after(1, BackendError::Connect("refused".into()));

        let results =
            outcomes(run_statements(&backend, "SELECT pg_sleep(10); SELECT 1", Duration::from_millis(20)).await);

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[1].1,
            StatementResult::ExecutionError { message: "SQL execution error: connection failed: refused".into() }
        );
    }

    #[tokio::test]
    async fn connect_failure_fails_the_batch() {
        let backend = FakeBackend::new().failing_connect(BackendError::Connect("refused".into()));

        let result = run_statements(&backend, "SELECT 1", TIMEOUT).await;

        assert_eq!(
            result,
            QueryResult::Failed { error: "SQL execution error: connection failed: refused".into(), raw_sql: None }
        );
    }
}
