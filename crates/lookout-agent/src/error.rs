//! Agent error types.
//!
//! Everything that can go wrong while talking to a language model surfaces
//! through [`AgentError`].

/// Unified error type for the language-model backend.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    // -- LLM errors ----------------------------------------------------------
    /// An HTTP request to the LLM provider failed.
    #[error("llm request failed: {reason}")]
    LlmRequestFailed { reason: String },

    /// The LLM response could not be parsed into the expected format.
    #[error("llm response parse error: {reason}")]
    LlmParseFailed { reason: String },

    /// The API key is missing for a provider that requires one.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// The provider name in the configuration is not recognised.
    #[error("unknown llm provider: {provider}")]
    UnknownProvider { provider: String },

    // -- Structured output ---------------------------------------------------
    /// The output schema itself could not be compiled.
    #[error("invalid output schema: {reason}")]
    InvalidSchema { reason: String },

    /// The model produced JSON that does not satisfy the output schema.
    #[error("output violates schema: {}", violations.join("; "))]
    SchemaViolation { violations: Vec<String> },

    /// An attachment cannot be sent to the model.
    #[error("unsupported attachment `{name}` ({media_type})")]
    UnsupportedAttachment { name: String, media_type: String },

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal agent error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the agent crate.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::LlmRequestFailed {
            reason: err.to_string(),
        }
    }
}
