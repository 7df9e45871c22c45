//! Error types for sentinel-core.

use thiserror::Error;

/// Result type alias using sentinel-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur across the scan pipeline and its workers.
#[derive(Error, Debug)]
pub enum Error {
    /// Reviewer backend error (transport, HTTP status, or unusable body)
    #[error("LLM backend error: {backend} - {message}")]
    Llm { backend: String, message: String },

    /// Timeout during an operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The validator walked its whole fallback model list without success
    #[error("Validator exhausted all fallback models")]
    ValidatorExhausted,

    /// Repository archive could not be downloaded or unpacked
    #[error("Archive error: {0}")]
    Archive(String),

    /// Source file could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Issue tracker API error
    #[error("Tracker error: {message}")]
    Tracker {
        status: Option<u16>,
        message: String,
    },

    /// Persistent store error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Webhook signature did not verify
    #[error("Webhook signature invalid")]
    SignatureInvalid,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an LLM backend error.
    pub fn llm(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Llm {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a tracker error without an HTTP status.
    pub fn tracker(message: impl Into<String>) -> Self {
        Self::Tracker {
            status: None,
            message: message.into(),
        }
    }

    /// Create a tracker error carrying the HTTP status.
    pub fn tracker_status(status: u16, message: impl Into<String>) -> Self {
        Self::Tracker {
            status: Some(status),
            message: message.into(),
        }
    }

    /// True when the error is the "model name not found" class that makes
    /// the validator advance through its fallback list.
    pub fn is_model_not_found(&self) -> bool {
        match self {
            Self::Llm { message, .. } => {
                let lower = message.to_ascii_lowercase();
                lower.contains("404") || lower.contains("not found") || lower.contains("not_found")
            }
            _ => false,
        }
    }
}
