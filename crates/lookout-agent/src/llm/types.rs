//! Core types for LLM interaction.
//!
//! These types are provider-agnostic; the [`super::client`] module translates
//! them into provider-specific wire formats.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions that shape model behavior.
    System,
    /// Input from the caller.
    User,
    /// Output from the LLM.
    Assistant,
}

/// Binary content sent alongside a user message (images, PDFs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Display name, usually the source file name.
    pub name: String,
    /// IANA media type, e.g. `image/png` or `application/pdf`.
    pub media_type: String,
    /// Raw bytes; base64-encoded on the wire.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Create a new attachment.
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data,
        }
    }

    /// Whether the attachment is an image.
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    /// Whether the attachment is a PDF document.
    pub fn is_pdf(&self) -> bool {
        self.media_type == "application/pdf"
    }
}

/// A single message in a conversation history.
#[derive(Debug, Clone)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,

    /// The textual content of the message.
    pub content: String,

    /// Binary attachments (only meaningful when `role == Role::User`).
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments: Vec::new(),
        }
    }

    /// Create a user message carrying attachments.
    pub fn user_with_attachments(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            attachments,
        }
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            attachments: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// A tool invocation requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the LLM.
    pub id: String,

    /// The name of the tool to invoke.
    pub name: String,

    /// Arguments as a JSON value.
    pub arguments: Value,
}

/// A tool definition exposed to the LLM.
///
/// Structured generation declares a single tool whose input schema is the
/// desired output schema and forces the model to call it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's input parameters.
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// LLM response
// ---------------------------------------------------------------------------

/// The high-level response from an LLM after processing a turn.
#[derive(Debug, Clone)]
pub enum LlmResponse {
    /// The model produced a text answer.
    Text(String),

    /// The model invoked one or more tools.
    ToolCalls(Vec<ToolCall>),
}

// ---------------------------------------------------------------------------
// Chat request
// ---------------------------------------------------------------------------

/// A full request to send to an LLM provider.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The model identifier. Empty means the client's default model.
    pub model: String,

    /// The conversation history.
    pub messages: Vec<Message>,

    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,

    /// Name of a tool the model must call, if any.
    pub forced_tool: Option<String>,

    /// Sampling temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: Option<f32>,

    /// Maximum tokens the model may generate in this turn.
    pub max_tokens: Option<u32>,
}
