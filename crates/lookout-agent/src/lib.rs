//! Language-model backend for Lookout.
//!
//! The pipeline never talks to a provider directly; it asks a
//! [`StructuredGenerator`] for JSON that satisfies a schema.
//!
//! ## Modules
//!
//! - [`llm`] -- LLM client and wire types.
//! - [`structured`] -- Schema-constrained generation on top of the client.
//! - [`error`] -- Agent error types.

pub mod error;
pub mod llm;
pub mod structured;

pub use error::{AgentError, Result};
pub use llm::{
    Attachment, ChatRequest, LlmClient, LlmClientConfig, LlmProvider, LlmResponse, Message, Role,
    ToolCall, ToolDefinition,
};
pub use structured::{OutputValidator, StructuredGenerator, StructuredPrompt, extract_json};
