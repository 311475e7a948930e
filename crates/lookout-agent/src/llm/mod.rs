//! LLM integration layer.
//!
//! - [`types`] -- Core data types (messages, attachments, tool calls).
//! - [`client`] -- HTTP client for Anthropic and OpenAI APIs.

pub mod client;
pub mod types;

pub use client::{LlmClient, LlmClientConfig, LlmProvider};
pub use types::{Attachment, ChatRequest, LlmResponse, Message, Role, ToolCall, ToolDefinition};
