//! Reviewer gateway: both primary reviewers plus the optional validator
//! behind one dependency-injected handle with a process lifetime.

use std::sync::Arc;

use crate::config::LlmSettings;
use crate::error::{Error, Result};

use super::client::{ChatCompletionsClient, CompletionBackend};
use super::validator::GeminiValidator;

/// Uniform access to the reviewer ensemble.
pub struct ReviewerGateway {
    primary: Arc<dyn CompletionBackend>,
    secondary: Arc<dyn CompletionBackend>,
    validator: Option<Arc<dyn CompletionBackend>>,
}

impl ReviewerGateway {
    /// Build the production gateway from settings.
    ///
    /// The validator is silently disabled when no credential is configured.
    pub fn from_settings(settings: &LlmSettings) -> Self {
        let primary = ChatCompletionsClient::new(
            "mistral",
            &settings.mistral_model,
            &settings.mistral_base_url,
            settings.mistral_timeout,
        );
        let secondary = ChatCompletionsClient::new(
            "qwen",
            &settings.qwen_model,
            &settings.qwen_base_url,
            settings.qwen_timeout,
        );
        let validator: Option<Arc<dyn CompletionBackend>> =
            settings.gemini_api_key.as_ref().map(|key| {
                Arc::new(GeminiValidator::new(
                    key,
                    &settings.gemini_model,
                    settings.gemini_timeout,
                )) as Arc<dyn CompletionBackend>
            });

        Self {
            primary: Arc::new(primary),
            secondary: Arc::new(secondary),
            validator,
        }
    }

    /// Build a gateway from explicit backends (tests, alternate deployments).
    pub fn new(
        primary: Arc<dyn CompletionBackend>,
        secondary: Arc<dyn CompletionBackend>,
        validator: Option<Arc<dyn CompletionBackend>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            validator,
        }
    }

    pub fn primary(&self) -> &Arc<dyn CompletionBackend> {
        &self.primary
    }

    pub fn secondary(&self) -> &Arc<dyn CompletionBackend> {
        &self.secondary
    }

    /// True when the validator is configured and not exhausted.
    pub async fn validator_available(&self) -> bool {
        match &self.validator {
            Some(v) => v.is_available().await,
            None => false,
        }
    }

    /// Ask the validator for a verdict. Errors when unconfigured or exhausted.
    pub async fn validate(&self, prompt: &str) -> Result<String> {
        match &self.validator {
            Some(v) => v.complete(prompt).await,
            None => Err(Error::ValidatorExhausted),
        }
    }
}
