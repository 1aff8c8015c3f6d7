//! Anthropic LLM client: paced, retrying text generation (spec §4.4).

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::LlmError;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const PACING_FLOOR: Duration = Duration::from_millis(500);
const MAX_RETRIES: u32 = 3;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, LlmError>;
}

/// `reqwest`-backed Anthropic Messages API client. Pacing and retry state
/// live behind a `tokio::sync::Mutex` so the client is safe to share across
/// concurrently-running batch items (spec §5: "internally stateful ...
/// implementers must make both clients safe for concurrent use").
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    last_call_started_at: Mutex<Option<Instant>>,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        AnthropicClient {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            last_call_started_at: Mutex::new(None),
        }
    }

    async fn wait_for_pacing_floor(&self) {
        let mut last = self.last_call_started_at.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < PACING_FLOOR {
                tokio::time::sleep(PACING_FLOOR - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn call_once(&self, prompt: &str, max_tokens: usize) -> Result<String, LlmError> {
        self.wait_for_pacing_floor().await;

        let body = json!({
            "model": "claude-3-5-sonnet-20241022",
            "max_tokens": max_tokens,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .http
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| LlmError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(LlmError::Provider(format!("{} {}", status.as_u16(), text)));
        }

        let parsed: MessagesResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Provider(e.to_string()))?;

        Ok(parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .map(|block| block.text)
            .unwrap_or_default())
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

fn is_retryable(message: &str) -> bool {
    ["429", "500", "529"].iter().any(|code| message.contains(code))
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn generate(&self, prompt: &str, max_tokens: usize) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.call_once(prompt, max_tokens).await {
                Ok(text) => return Ok(text),
                Err(err) => {
                    attempt += 1;
                    if attempt >= MAX_RETRIES || !is_retryable(&err.to_string()) {
                        return Err(err);
                    }
                    let backoff = Duration::from_millis(2u64.pow(attempt) * 2000);
                    warn!("llm call failed (attempt {attempt}), retrying in {backoff:?}: {err}");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}
