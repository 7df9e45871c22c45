//! LLM gateway: uniform request/response over the reviewer ensemble.
//!
//! Two primary reviewers speak the OpenAI-style chat-completions contract
//! with per-backend timeouts; the optional cloud validator speaks the
//! Gemini wire and manages its own fallback model list. Every call is a
//! single attempt so upstream can bound tail latency deterministically.

mod client;
mod gateway;
mod types;
mod validator;

pub use client::{normalize_base_url, ChatCompletionsClient, CompletionBackend};
pub use gateway::ReviewerGateway;
pub use types::{
    ChatChoice, ChatChoiceMessage, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
    ChatRole,
};
pub use validator::GeminiValidator;
