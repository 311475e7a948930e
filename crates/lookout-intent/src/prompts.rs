//! Model instructions and output schemas for the two extraction stages.

use serde_json::{Value, json};

use crate::document::Document;
use crate::types::Lookout;

// ---------------------------------------------------------------------------
// Lookout extraction
// ---------------------------------------------------------------------------

pub(crate) const LOOKOUT_SYSTEM_PROMPT: &str = r#"You identify the kinds of changes a set of external actions can make, so that a later step knows what to look for in documents. The later step receives the actions again; do not pick actions now.

Rules:
- Only consider intents that CREATE or UPDATE something (issues, tasks, events, docs, pull requests, bookmarks, contacts, reminders, checklists).
- Emit one lookout per distinct underlying intent. When several actions would serve the same intent, emit a single generic lookout.
- Stay tool-agnostic: never put action names or action-specific parameter names in "watchFor" or "fields".
- "watchFor" holds short phrases or situations to detect, e.g. "schedule a meeting", "open a bug".
- "fields" holds the minimal information to extract, e.g. title, description, dueDate, assignees, labels, start, end, attendees, location, link, idToUpdate.
- "sourceText" is optional and short.
- Never invent identifiers or details.
- If no action creates or updates anything, return an empty array."#;

/// Output schema: an array of lookouts.
pub(crate) fn lookout_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "intent": { "type": "string", "enum": ["create", "update"] },
                "targetType": { "type": "string", "minLength": 1 },
                "watchFor": { "type": "array", "items": { "type": "string" } },
                "fields": { "type": "array", "items": { "type": "string" } },
                "sourceText": { "type": "string" }
            },
            "required": ["intent", "targetType", "watchFor", "fields"]
        }
    })
}

/// User message for lookout extraction: the condensed catalog.
pub(crate) fn lookout_user_prompt(condensed_actions: &Value) -> String {
    format!(
        "Available actions (JSON):\n```json\n{}\n```\n\nReturn the lookouts as a JSON array.",
        serde_json::to_string_pretty(condensed_actions).unwrap_or_else(|_| "[]".into())
    )
}

// ---------------------------------------------------------------------------
// Intent extraction
// ---------------------------------------------------------------------------

pub(crate) const INTENT_SYSTEM_PROMPT: &str = r#"You read a document and decide which of the given lookouts it triggers. Each lookout has an intent (create or update), a targetType, phrases to watchFor and the fields to extract.

Process:
1. Read every lookout.
2. Find every passage that matches a lookout, explicitly or implicitly.
3. For each match, extract the listed fields plus clearly useful extras such as links. Never fabricate values; leave a field out when the document does not state it.
4. An update is only "called" when the document names an unambiguous identifier of the existing item (put it in a field such as idToUpdate). Otherwise mark it "skipped" and give the reason.
5. When one passage describes several distinct entities, emit one match per entity.
6. When several lookouts describe the same action on the same entity, emit a single best-fit match.
7. Infer defaults only when safe, e.g. a 30 minute duration for a meeting with a start time but no end.
8. When a required field is missing and cannot be inferred, mark the match "skipped" with a reason.

Return a JSON array of matches. Set "lookoutIndex" to the index of the lookout each match belongs to. Use dates in ISO-8601 (YYYY-MM-DDTHH:MM). Keep titles short and precise. Return an empty array when nothing matches."#;

/// Output schema: an array of candidate matches.
pub(crate) fn intent_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "properties": {
                "lookoutIndex": { "type": "integer", "minimum": 0 },
                "intent": { "type": "string", "enum": ["create", "update"] },
                "targetType": { "type": "string" },
                "status": { "type": "string", "enum": ["called", "skipped"] },
                "reason": { "type": "string" },
                "extractedFields": { "type": "object" },
                "payloadPreview": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "keyFields": { "type": "array", "items": { "type": "string" } }
                    }
                }
            },
            "required": ["intent", "targetType", "status"]
        }
    })
}

/// User message for intent extraction.
pub(crate) fn intent_user_prompt(document: &Document, lookouts: &[Lookout]) -> String {
    let lookouts_json = serde_json::to_string_pretty(lookouts).unwrap_or_else(|_| "[]".into());
    let kind = describe_content(document);
    let mut prompt = format!(
        "Document name: {}\nDocument content: {kind}\n\nLookouts (JSON, index = position):\n```json\n{lookouts_json}\n```\n",
        document.name
    );
    let text = document.text_content();
    if !text.trim().is_empty() {
        prompt.push_str("\nDocument text:\n\"\"\"\n");
        prompt.push_str(&text);
        prompt.push_str("\n\"\"\"\n");
    }
    prompt
}

fn describe_content(document: &Document) -> &'static str {
    let attachments = document.attachments();
    let has_text = !document.text_content().trim().is_empty();
    match (has_text, attachments.is_empty()) {
        (true, true) => "text",
        (false, false) if attachments.iter().all(|a| a.is_image()) => "image (attached)",
        (false, false) if attachments.iter().all(|a| a.is_pdf()) => "PDF document (attached)",
        (false, false) => "attached files",
        (true, false) => "text plus attached files",
        (false, true) => "empty",
    }
}
