//! Cloud validator backend (Google Gemini).
//!
//! The validator is optional: without an API key it is never constructed.
//! Model names on the free tier churn, so a 404/"not found" class error
//! advances through a fallback list; the first name that answers is cached
//! for the rest of the process. When the list is exhausted the validator
//! marks itself permanently unavailable.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{Error, Result};

use super::client::CompletionBackend;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model names tried after the configured one, newest first.
const FALLBACK_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

#[derive(Debug, Clone, PartialEq)]
enum ModelState {
    Unresolved,
    Resolved(String),
    Exhausted,
}

/// Gemini validator with a process-scoped resolved-model cache.
pub struct GeminiValidator {
    api_key: String,
    base_url: String,
    candidates: Vec<String>,
    timeout: Duration,
    http: Client,
    // Process-scoped cache: resolved once, kept until exhaustion.
    state: RwLock<ModelState>,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiValidator {
    pub fn new(api_key: impl Into<String>, preferred_model: &str, timeout: Duration) -> Self {
        let mut candidates = vec![preferred_model.to_string()];
        for fallback in FALLBACK_MODELS {
            if *fallback != preferred_model {
                candidates.push((*fallback).to_string());
            }
        }

        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            candidates,
            timeout,
            http: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            state: RwLock::new(ModelState::Unresolved),
        }
    }

    /// Override the API base URL (tests, regional endpoints).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn try_model(&self, model: &str, prompt: &str) -> Result<String> {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.1,
                max_output_tokens: 256,
            },
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self.http.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout(self.timeout.as_millis() as u64)
            } else {
                Error::llm("gemini", format!("HTTP request failed: {e}"))
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Error::llm("gemini", format!("failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(Error::llm("gemini", format!("HTTP {status}: {text}")));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| Error::llm("gemini", format!("failed to parse response: {e}")))?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| Error::llm("gemini", "no candidates in response"))?;

        Ok(content)
    }
}

#[async_trait]
impl CompletionBackend for GeminiValidator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let start = {
            let state = self.state.read().await;
            match &*state {
                ModelState::Exhausted => return Err(Error::ValidatorExhausted),
                ModelState::Resolved(model) => self
                    .candidates
                    .iter()
                    .position(|c| c == model)
                    .unwrap_or(0),
                ModelState::Unresolved => 0,
            }
        };

        for model in &self.candidates[start..] {
            match self.try_model(model, prompt).await {
                Ok(text) => {
                    let mut state = self.state.write().await;
                    if *state != ModelState::Resolved(model.clone()) {
                        info!(%model, "validator model resolved");
                        *state = ModelState::Resolved(model.clone());
                    }
                    return Ok(text);
                }
                Err(e) if e.is_model_not_found() => {
                    warn!(%model, error = %e, "validator model not found, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        let mut state = self.state.write().await;
        *state = ModelState::Exhausted;
        warn!("validator disabled for the rest of the process");
        Err(Error::ValidatorExhausted)
    }

    fn name(&self) -> &str {
        "gemini"
    }

    /// False once the fallback list has been exhausted.
    async fn is_available(&self) -> bool {
        *self.state.read().await != ModelState::Exhausted
    }
}
