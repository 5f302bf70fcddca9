use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use askdb_core::config::{LlmConfig, LlmProvider};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const NOT_CONFIGURED: &str = "LLM not configured";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Opaque text-in/text-out generation capability.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Stands in for a provider whose credential is missing. Every call fails.
#[derive(Clone, Copy, Debug)]
pub struct UnconfiguredLlm {
    provider: LlmProvider,
}

impl UnconfiguredLlm {
    pub fn new(provider: LlmProvider) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl LlmClient for UnconfiguredLlm {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("{NOT_CONFIGURED}: set ASKDB_LLM_API_KEY for {}", self.provider.as_str()))
    }
}

pub struct HttpLlmClient {
    provider: LlmProvider,
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(attempt_timeout(config))
            .build()
            .context("building LLM http client")?;

        Ok(Self {
            provider: config.provider,
            http,
            endpoint: config.endpoint().to_string(),
            model: config.model.clone(),
            api_key: config.api_key().map(|key| SecretString::from(key.to_string())),
            max_retries: config.max_retries,
        })
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let key = self.api_key.as_ref().map(|key| key.expose_secret()).unwrap_or_default();
        match self.provider {
            LlmProvider::OpenAi => self
                .http
                .post(format!("{}/v1/chat/completions", self.endpoint))
                .bearer_auth(key)
                .json(&json!({
                    "model": self.model,
                    "messages": [{"role": "user", "content": prompt}],
                })),
            LlmProvider::Anthropic => self
                .http
                .post(format!("{}/v1/messages", self.endpoint))
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&json!({
                    "model": self.model,
                    "max_tokens": ANTHROPIC_MAX_TOKENS,
                    "messages": [{"role": "user", "content": prompt}],
                })),
            LlmProvider::Ollama => {
                self.http.post(format!("{}/api/generate", self.endpoint)).json(&json!({
                    "model": self.model,
                    "prompt": prompt,
                    "stream": false,
                }))
            }
            LlmProvider::Gemini => self
                .http
                .post(format!("{}/v1beta/models/{}:generateContent", self.endpoint, self.model))
                .header("x-goog-api-key", key)
                .json(&json!({"contents": [{"parts": [{"text": prompt}]}]})),
        }
    }

    async fn attempt(&self, prompt: &str) -> Result<String, Attempt> {
        let response = self.request(prompt).send().await.map_err(|error| Attempt::Retry(error.into()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = anyhow!("{} returned HTTP {status}: {}", self.provider.as_str(), truncate(&body));
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                Attempt::Retry(error)
            } else {
                Attempt::Fatal(error)
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|error| Attempt::Fatal(anyhow!("invalid provider response: {error}")))?;
        extract_text(self.provider, &payload).map_err(Attempt::Fatal)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let mut attempt_number = 0;
        loop {
            match self.attempt(prompt).await {
                Ok(text) => return Ok(text),
                Err(Attempt::Retry(error)) if attempt_number < self.max_retries => {
                    attempt_number += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        provider = self.provider.as_str(),
                        attempt = attempt_number,
                        error = %error,
                        "retrying LLM request"
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt_number).await;
                }
                Err(Attempt::Retry(error)) | Err(Attempt::Fatal(error)) => return Err(error),
            }
        }
    }
}

enum Attempt {
    Retry(anyhow::Error),
    Fatal(anyhow::Error),
}

fn extract_text(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::OpenAi => {
            payload.pointer("/choices/0/message/content").and_then(Value::as_str).map(str::to_string)
        }
        LlmProvider::Anthropic => joined_text(payload.get("content")),
        LlmProvider::Ollama => payload.get("response").and_then(Value::as_str).map(str::to_string),
        LlmProvider::Gemini => joined_text(payload.pointer("/candidates/0/content/parts")),
    };

    match text {
        Some(text) => Ok(text),
        None => bail!("{} response did not contain any text", provider.as_str()),
    }
}

fn joined_text(parts: Option<&Value>) -> Option<String> {
    let parts = parts?.as_array()?;
    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    (!parts.is_empty()).then_some(text)
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 300;
    match body.char_indices().nth(LIMIT) {
        Some((index, _)) => format!("{}...", &body[..index]),
        None => body.to_string(),
    }
}

fn attempt_timeout(config: &LlmConfig) -> Duration {
    Duration::from_secs(config.timeout_secs.max(1))
}

/// Longest one [`LlmClient::complete`] call may take: every attempt allowed
/// by `max_retries` running to its own timeout, plus the backoff between them.
pub fn call_budget(config: &LlmConfig) -> Duration {
    let attempts = config.max_retries.saturating_add(1);
    let backoff = (1..=config.max_retries)
        .fold(Duration::ZERO, |total, retry| total.saturating_add(RETRY_BACKOFF.saturating_mul(retry)));
    attempt_timeout(config).saturating_mul(attempts).saturating_add(backoff)
}

/// Builds the collaborator named by configuration. A provider that needs a
/// credential but has none yields [`UnconfiguredLlm`] so the service can
/// still start.
pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    if config.provider.requires_api_key() && config.api_key().is_none() {
        warn!(
            event_name = "llm.client.unconfigured",
            provider = config.provider.as_str(),
            "no API key configured; generation calls will fail"
        );
        return Ok(Arc::new(UnconfiguredLlm::new(config.provider)));
    }

    let client = HttpLlmClient::new(config)?;
    debug!(
        event_name = "llm.client.ready",
        provider = config.provider.as_str(),
        model = %config.model,
        endpoint = %client.endpoint,
        "LLM client configured"
    );
    Ok(Arc::new(client))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use askdb_core::config::{AppConfig, LlmProvider};
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    use super::{call_budget, client_from_config, extract_text, truncate, LlmClient, NOT_CONFIGURED};

    #[test]
    fn extracts_text_from_each_provider_shape() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "SELECT 1"}}]});
        let anthropic = json!({"content": [{"type": "text", "text": "SELECT "}, {"type": "text", "text": "1"}]});
        let ollama = json!({"model": "llama3.1", "response": "SELECT 1", "done": true});
        let gemini = json!({"candidates": [{"content": {"parts": [{"text": "SELECT 1"}]}}]});

        assert_eq!(extract_text(LlmProvider::OpenAi, &openai).ok().as_deref(), Some("SELECT 1"));
        assert_eq!(extract_text(LlmProvider::Anthropic, &anthropic).ok().as_deref(), Some("SELECT 1"));
        assert_eq!(extract_text(LlmProvider::Ollama, &ollama).ok().as_deref(), Some("SELECT 1"));
        assert_eq!(extract_text(LlmProvider::Gemini, &gemini).ok().as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn missing_text_is_an_error() {
        let blocked = json!({"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}});
        assert!(extract_text(LlmProvider::Gemini, &blocked).is_err());
        assert!(extract_text(LlmProvider::OpenAi, &json!({"choices": []})).is_err());
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(1000);
        assert_eq!(truncate(&body).len(), 303);
        assert_eq!(truncate("short"), "short");
    }

    #[tokio::test]
    async fn provider_without_key_fails_every_call() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Gemini;
        config.api_key = None;

        let client = client_from_config(&config).expect("client should build");
        let error = client.complete("anything").await.expect_err("call must fail");
        assert!(error.to_string().starts_with(NOT_CONFIGURED));
    }

    #[test]
    fn call_budget_covers_every_attempt_and_backoff() {
        let mut config = AppConfig::default().llm;
        config.timeout_secs = 30;
        config.max_retries = 2;
        assert_eq!(call_budget(&config), Duration::from_millis(91_500));

        config.max_retries = 0;
        assert_eq!(call_budget(&config), Duration::from_secs(30));
    }

    async fn read_request(stream: &mut TcpStream) -> std::io::Result<()> {
        let mut request = Vec::new();
        let mut chunk = [0_u8; 1024];
        loop {
            let read = stream.read(&mut chunk).await?;
            if read == 0 {
                return Ok(());
            }
            request.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&request).to_ascii_lowercase();
            if let Some(header_end) = text.find("\r\n\r\n") {
                let body_len = text
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if request.len() >= header_end + 4 + body_len {
                    return Ok(());
                }
            }
        }
    }

    /// Leaves the first request hanging and answers the second.
    async fn stall_then_answer(listener: TcpListener, body: &'static str) -> std::io::Result<()> {
        let (mut stalled, _) = listener.accept().await?;
        read_request(&mut stalled).await?;

        let (mut answered, _) = listener.accept().await?;
        read_request(&mut answered).await?;
        let response = format!(
            "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        answered.write_all(response.as_bytes()).await?;
        answered.shutdown().await?;
        drop(stalled);
        Ok(())
    }

    #[tokio::test]
    async fn stalled_attempt_is_retried_within_the_call_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        let server = tokio::spawn(stall_then_answer(listener, r#"{"response": "SELECT 1", "done": true}"#));

        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::Ollama;
        config.base_url = Some(format!("http://{address}"));
        config.timeout_secs = 1;
        config.max_retries = 1;

        let client = client_from_config(&config).expect("client should build");
        let reply = tokio::time::timeout(call_budget(&config), client.complete("How many customers?"))
            .await
            .expect("retry should finish inside the budget")
            .expect("second attempt should succeed");

        assert_eq!(reply, "SELECT 1");
        server.await.expect("server task").expect("server io");
    }
}
