//! Completion backend trait and the chat-completions client.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};

use super::types::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage};

/// Fixed system prompt for all reviewer calls.
const SYSTEM_PROMPT: &str = "You are a helpful security agent.";

/// Low temperature for deterministic security analysis.
const TEMPERATURE: f64 = 0.1;

/// Verdicts are one short JSON object; cap the generation hard.
const MAX_TOKENS: u32 = 120;

/// A single-attempt completion backend.
///
/// One attempt per call, no retries, so upstream can bound tail latency
/// deterministically. Callers convert any error into "no opinion".
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Complete a prompt, returning the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Whether the backend is currently usable. Most backends always are;
    /// the validator reports false once its fallback list is exhausted.
    async fn is_available(&self) -> bool {
        true
    }
}

/// Normalise a reviewer base URL.
///
/// Operators configure bases with or without trailing `/v1` or `/chat`
/// segments; both are stripped (repeatedly) so the canonical
/// `/v1/chat/completions` suffix can be appended exactly once.
pub fn normalize_base_url(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    loop {
        if let Some(stripped) = base
            .strip_suffix("/v1")
            .or_else(|| base.strip_suffix("/chat"))
        {
            base = stripped.trim_end_matches('/').to_string();
        } else {
            break;
        }
    }
    base
}

fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// OpenAI-compatible chat-completions client for one reviewer backend.
pub struct ChatCompletionsClient {
    name: String,
    model: String,
    base_url: String,
    timeout: Duration,
    http: Client,
}

impl ChatCompletionsClient {
    pub fn new(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            base_url: normalize_base_url(base_url),
            timeout,
            http: build_http_client(timeout),
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionBackend for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = self.completions_url();
        debug!(backend = %self.name, %url, "sending completion request");

        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(self.timeout.as_millis() as u64)
            } else {
                Error::llm(&self.name, format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::llm(&self.name, format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Error::llm(&self.name, format!("HTTP {status}: {text}")));
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| Error::llm(&self.name, format!("failed to parse response: {e}")))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::llm(&self.name, "no choices in response"))?;

        Ok(content)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
