//! Schema-constrained generation.
//!
//! [`StructuredGenerator`] is the seam between the pipeline and whatever
//! language model backs it: given a prompt and a JSON Schema, it returns a
//! JSON value that satisfies the schema or an error.
//!
//! [`LlmClient`] implements it by declaring a single `emit_result` tool whose
//! input wraps the output schema and forcing the model to call it. A model
//! that answers in plain text instead is tolerated; the first JSON value in
//! the text is used. Either way the value is validated before it is returned.

use async_trait::async_trait;
use jsonschema::{Draft, JSONSchema};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::llm::{Attachment, ChatRequest, LlmClient, LlmResponse, Message, ToolDefinition};

/// Name of the tool used to carry structured output.
const EMIT_TOOL_NAME: &str = "emit_result";

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

/// A single-turn prompt for structured generation.
#[derive(Debug, Clone, Default)]
pub struct StructuredPrompt {
    /// Instructions for the model.
    pub system: String,
    /// The task input (lookouts, document text, catalog summary ...).
    pub user: String,
    /// Binary document content (images, PDFs).
    pub attachments: Vec<Attachment>,
}

impl StructuredPrompt {
    /// Create a text-only prompt.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            attachments: Vec::new(),
        }
    }

    /// Attach binary content to the prompt.
    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// A backend able to produce JSON that conforms to a schema.
#[async_trait]
pub trait StructuredGenerator: Send + Sync {
    /// Generate a value for `prompt` that validates against `schema`.
    async fn generate_structured(&self, prompt: &StructuredPrompt, schema: &Value)
    -> Result<Value>;
}

#[async_trait]
impl StructuredGenerator for LlmClient {
    async fn generate_structured(
        &self,
        prompt: &StructuredPrompt,
        schema: &Value,
    ) -> Result<Value> {
        let validator = OutputValidator::new(schema)?;

        let request = ChatRequest {
            model: String::new(),
            messages: vec![
                Message::system(prompt.system.clone()),
                Message::user_with_attachments(prompt.user.clone(), prompt.attachments.clone()),
            ],
            tools: vec![emit_tool(schema)],
            forced_tool: Some(EMIT_TOOL_NAME.to_owned()),
            temperature: Some(0.0),
            max_tokens: None,
        };

        debug!(
            provider = self.provider().as_str(),
            attachments = prompt.attachments.len(),
            "requesting structured output"
        );

        let value = match self.chat(&request).await? {
            LlmResponse::ToolCalls(calls) => {
                let call = calls
                    .into_iter()
                    .find(|c| c.name == EMIT_TOOL_NAME)
                    .ok_or_else(|| AgentError::LlmParseFailed {
                        reason: format!("model did not call `{EMIT_TOOL_NAME}`"),
                    })?;
                unwrap_emitted(call.arguments)
            }
            LlmResponse::Text(text) => {
                warn!("model answered with text instead of a tool call");
                extract_json(&text)?
            }
        };

        validator.validate(&value)?;
        info!("structured output validated");
        Ok(value)
    }
}

/// Tool input must be an object, so the output schema is wrapped in one.
fn emit_tool(schema: &Value) -> ToolDefinition {
    ToolDefinition {
        name: EMIT_TOOL_NAME.to_owned(),
        description: "Return the final answer. Always call this exactly once.".to_owned(),
        input_schema: json!({
            "type": "object",
            "properties": { "result": schema },
            "required": ["result"],
        }),
    }
}

fn unwrap_emitted(arguments: Value) -> Value {
    match arguments {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// A compiled output schema.
pub struct OutputValidator {
    schema: JSONSchema,
}

impl OutputValidator {
    /// Compile `schema` (draft 7).
    pub fn new(schema: &Value) -> Result<Self> {
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| AgentError::InvalidSchema {
                reason: e.to_string(),
            })?;
        Ok(Self { schema })
    }

    /// Check `value` against the schema, collecting every violation.
    pub fn validate(&self, value: &Value) -> Result<()> {
        if let Err(errors) = self.schema.validate(value) {
            let violations: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            return Err(AgentError::SchemaViolation { violations });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Text fallback
// ---------------------------------------------------------------------------

/// Parse the first JSON value out of free-form model text.
///
/// Handles markdown code fences and leading or trailing prose.
pub fn extract_json(text: &str) -> Result<Value> {
    let cleaned = text.trim();
    let cleaned = cleaned.strip_prefix("```json").unwrap_or(cleaned);
    let cleaned = cleaned.strip_prefix("```").unwrap_or(cleaned);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned);
    let cleaned = cleaned.trim();

    if let Ok(v) = serde_json::from_str::<Value>(cleaned) {
        return Ok(v);
    }

    let start = cleaned
        .find(['[', '{'])
        .ok_or_else(|| AgentError::LlmParseFailed {
            reason: "no JSON value in model output".into(),
        })?;

    let mut stream = serde_json::Deserializer::from_str(&cleaned[start..]).into_iter::<Value>();
    match stream.next() {
        Some(Ok(v)) => Ok(v),
        Some(Err(e)) => Err(AgentError::LlmParseFailed {
            reason: format!("failed to parse model output as JSON: {e}"),
        }),
        None => Err(AgentError::LlmParseFailed {
            reason: "no JSON value in model output".into(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array_of_strings() -> Value {
        json!({ "type": "array", "items": { "type": "string" } })
    }

    #[test]
    fn extract_json_plain() {
        assert_eq!(extract_json("[1, 2]").unwrap(), json!([1, 2]));
    }

    #[test]
    fn extract_json_strips_code_fences() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(text).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn extract_json_skips_surrounding_prose() {
        let text = "Here you go: [{\"x\": true}] hope that helps";
        assert_eq!(extract_json(text).unwrap(), json!([{"x": true}]));
    }

    #[test]
    fn extract_json_without_json_fails() {
        assert!(extract_json("nothing to see").is_err());
    }

    #[test]
    fn validator_accepts_conforming_value() {
        let v = OutputValidator::new(&array_of_strings()).unwrap();
        assert!(v.validate(&json!(["a", "b"])).is_ok());
    }

    #[test]
    fn validator_reports_violations() {
        let v = OutputValidator::new(&array_of_strings()).unwrap();
        match v.validate(&json!(["a", 3])) {
            Err(AgentError::SchemaViolation { violations }) => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].starts_with("/1"));
            }
            other => panic!("expected schema violation, got {other:?}"),
        }
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let err = OutputValidator::new(&json!({ "type": 12 })).err();
        assert!(matches!(err, Some(AgentError::InvalidSchema { .. })));
    }

    #[test]
    fn emit_tool_wraps_schema() {
        let tool = emit_tool(&array_of_strings());
        assert_eq!(tool.name, EMIT_TOOL_NAME);
        assert_eq!(tool.input_schema["properties"]["result"]["type"], "array");
        assert_eq!(tool.input_schema["required"][0], "result");
    }

    #[test]
    fn unwrap_emitted_takes_result_field() {
        assert_eq!(unwrap_emitted(json!({"result": [1]})), json!([1]));
        assert_eq!(unwrap_emitted(json!([2])), json!([2]));
    }
}
