//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use askdb_core::config::DatabaseBackend;
use askdb_core::{BackendError, BackendSession, NativeValue, QueryOutput, SqlBackend};
use async_trait::async_trait;

use crate::llm::LlmClient;

#[derive(Default)]
struct Counters {
    connects: AtomicUsize,
    closes: AtomicUsize,
    executed: Mutex<Vec<String>>,
    statement_limits: Mutex<Vec<Duration>>,
}

#[derive(Clone, Default)]
struct Script {
    tables: Vec<(String, Vec<String>)>,
    results: HashMap<String, Result<QueryOutput, BackendError>>,
    catalog_error: Option<BackendError>,
    delays: HashMap<String, Duration>,
}

/// Backend whose catalog and statement results are fixed up front.
#[derive(Default)]
pub struct FakeBackend {
    script: Script,
    connect_error: Option<BackendError>,
    successful_connects: usize,
    counters: Arc<Counters>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: &str, columns: &[&str]) -> Self {
        let columns = columns.iter().map(|column| column.to_string()).collect();
        self.script.tables.push((name.to_string(), columns));
        self
    }

    pub fn with_result(mut self, statement: &str, columns: &[&str], rows: Vec<Vec<NativeValue>>) -> Self {
        let columns = columns.iter().map(|column| column.to_string()).collect();
        self.script.results.insert(statement.to_string(), Ok(QueryOutput { columns, rows }));
        self
    }

    pub fn with_error(mut self, statement: &str, error: BackendError) -> Self {
        self.script.results.insert(statement.to_string(), Err(error));
        self
    }

    pub fn with_delay(mut self, statement: &str, delay: Duration) -> Self {
        self.script.delays.insert(statement.to_string(), delay);
        self
    }

    pub fn failing_connect(self, error: BackendError) -> Self {
        self.failing_connect_after(0, error)
    }

    /// Accepts `successful` connections, then refuses every later one.
    pub fn failing_connect_after(mut self, successful: usize, error: BackendError) -> Self {
        self.connect_error = Some(error);
        self.successful_connects = successful;
        self
    }

    pub fn failing_catalog(mut self, error: BackendError) -> Self {
        self.script.catalog_error = Some(error);
        self
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn open_sessions(&self) -> usize {
        self.connects() - self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.counters.executed.lock().map(|executed| executed.clone()).unwrap_or_default()
    }

    pub fn statement_limits(&self) -> Vec<Duration> {
        self.counters.statement_limits.lock().map(|limits| limits.clone()).unwrap_or_default()
    }

    /// Lets sessions abandoned to background tasks finish closing.
    pub async fn settle(&self) {
        for _ in 0..16 {
            if self.open_sessions() == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl SqlBackend for FakeBackend {
    fn kind(&self) -> DatabaseBackend {
        DatabaseBackend::Sqlite
    }

    async fn connect(&self) -> Result<Box<dyn BackendSession>, BackendError> {
        if let Some(error) = &self.connect_error {
            if self.connects() >= self.successful_connects {
                return Err(error.clone());
            }
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession { script: self.script.clone(), counters: self.counters.clone() }))
    }
}

struct FakeSession {
    script: Script,
    counters: Arc<Counters>,
}

#[async_trait]
impl BackendSession for FakeSession {
    async fn set_statement_limit(&mut self, limit: Duration) -> Result<(), BackendError> {
        if let Ok(mut limits) = self.counters.statement_limits.lock() {
            limits.push(limit);
        }
        Ok(())
    }

    async fn execute(&mut self, statement: &str, _params: &[NativeValue]) -> Result<QueryOutput, BackendError> {
        if let Ok(mut executed) = self.counters.executed.lock() {
            executed.push(statement.to_string());
        }
        if let Some(delay) = self.script.delays.get(statement) {
            tokio::time::sleep(*delay).await;
        }
        self.script
            .results
            .get(statement)
            .cloned()
            .unwrap_or_else(|| Err(BackendError::Query(format!("no such table in `{statement}`"))))
    }

    async fn list_tables(&mut self) -> Result<Vec<String>, BackendError> {
        if let Some(error) = &self.script.catalog_error {
            return Err(error.clone());
        }
        Ok(self.script.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    async fn list_columns(&mut self, table: &str) -> Result<Vec<String>, BackendError> {
        Ok(self
            .script
            .tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, columns)| columns.clone())
            .unwrap_or_default())
    }

    async fn close(self: Box<Self>) -> Result<(), BackendError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Replies with scripted responses in call order and records every prompt.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<&'static str, &'static str>>,
    {
        let replies = replies
            .into_iter()
            .map(|reply| reply.map(str::to_string).map_err(str::to_string))
            .collect();
        Self { replies: Mutex::new(replies), prompts: Mutex::default() }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|prompts| prompts.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        let reply = self.replies.lock().ok().and_then(|mut replies| replies.pop_front());
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply left")),
        }
    }
}
