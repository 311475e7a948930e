//! Pipeline error types.
//!
//! Run-level failures surface through [`IntentError`]. Failures of a single
//! action invocation are not errors of the run; see
//! [`crate::dispatcher::ActionInvocationError`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Unified error type for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    // -- Run-level errors ----------------------------------------------------
    /// The language model failed or returned output that violates the
    /// expected schema. Never retried.
    #[error("generation failed during {stage}: {reason}")]
    Generation { stage: Stage, reason: String },

    /// A fetch or model call exceeded its bound.
    #[error("{stage} timed out after {seconds}s")]
    Timeout { stage: Stage, seconds: u64 },

    /// The document could not be turned into model input.
    #[error("failed to parse document `{document}`: {reason}")]
    Parse { document: String, reason: String },

    // -- Upstream crate errors -----------------------------------------------
    /// The document source failed.
    #[error("document source error: {0}")]
    Source(#[from] lookout_adapters::AdapterError),

    /// The status sink could not record a run.
    #[error("status sink error: {0}")]
    Sink(String),

    /// An error shared between callers that awaited the same computation.
    #[error("{0}")]
    Shared(Arc<IntentError>),
}

/// Pipeline stage, used to label errors and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    LookoutExtraction,
    IntentExtraction,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fetch => write!(f, "fetch"),
            Self::LookoutExtraction => write!(f, "lookout extraction"),
            Self::IntentExtraction => write!(f, "intent extraction"),
        }
    }
}

impl IntentError {
    /// Whether the failure lies in the document itself rather than in the
    /// processing machinery.
    pub fn is_parse_error(&self) -> bool {
        match self {
            Self::Parse { .. } => true,
            Self::Shared(inner) => inner.is_parse_error(),
            _ => false,
        }
    }

    pub(crate) fn generation(stage: Stage, reason: impl std::fmt::Display) -> Self {
        Self::Generation {
            stage,
            reason: reason.to_string(),
        }
    }
}

/// Convenience alias used throughout the pipeline crate.
pub type Result<T> = std::result::Result<T, IntentError>;
