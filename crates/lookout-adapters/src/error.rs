//! Adapter error types.
//!
//! Action providers, the catalog and document sources all surface errors
//! through [`AdapterError`].

/// Unified error type for Lookout adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed within the adapter.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// The requested action does not exist on this provider or catalog.
    #[error("action not found: `{action}` on `{provider_id}`")]
    ActionNotFound { provider_id: String, action: String },

    /// Two providers declared the same action name.
    #[error("duplicate action `{action}` declared by `{first}` and `{second}`")]
    DuplicateAction {
        action: String,
        first: String,
        second: String,
    },

    /// The payload supplied to an action is invalid.
    #[error("invalid parameters for action `{action}`: {reason}")]
    InvalidParams { action: String, reason: String },

    /// An action invocation failed.
    #[error("execution failed for action `{action}`: {reason}")]
    ExecutionFailed { action: String, reason: String },

    /// The remote service answered with a non-success status.
    #[error("`{action}` returned HTTP {status}: {body}")]
    HttpStatus {
        action: String,
        status: u16,
        body: String,
    },

    /// The provider requires credentials that have not been configured.
    #[error("authentication required for `{provider_id}`: provider={provider}")]
    AuthRequired {
        provider_id: String,
        provider: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// A document reference could not be resolved.
    #[error("document `{reference}` unavailable: {reason}")]
    SourceUnavailable { reference: String, reason: String },

    /// A document exceeds the configured size limit.
    #[error("document `{reference}` is {size} bytes, limit is {limit}")]
    TooLarge {
        reference: String,
        size: u64,
        limit: u64,
    },

    /// Configuration error in adapter setup.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Catch-all for unexpected internal errors.
    #[error("internal adapter error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
