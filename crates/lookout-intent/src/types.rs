//! Core pipeline types: lookouts and intent matches.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The kind of change an intent asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Create,
    Update,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool-agnostic pattern to watch for in documents.
///
/// `watch_for` and `fields` describe the intent in plain language; they never
/// name a concrete action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lookout {
    pub intent: IntentKind,
    /// Kind of entity affected (`event`, `issue`, `task` ...).
    pub target_type: String,
    /// Phrases or situations that signal the intent.
    pub watch_for: Vec<String>,
    /// Information to extract when the intent is found.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_text: Option<String>,
}

impl Lookout {
    /// Whether `intent` and `target_type` identify this lookout.
    pub fn is_for(&self, intent: IntentKind, target_type: &str) -> bool {
        self.intent == intent && self.target_type.eq_ignore_ascii_case(target_type.trim())
    }
}

/// Dispatch decision for a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Called,
    Skipped,
}

/// Short human-oriented summary of what a match would do.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadPreview {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub key_fields: Vec<String>,
    /// Safe defaults applied while building the match.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

/// One detected instance of a lookout in a document, plus the decision
/// whether to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentMatch {
    pub intent: IntentKind,
    pub target_type: String,
    pub status: MatchStatus,
    /// Present iff `status` is [`MatchStatus::Skipped`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub extracted_fields: Map<String, Value>,
    #[serde(default)]
    pub payload_preview: PayloadPreview,
}

impl IntentMatch {
    pub fn is_called(&self) -> bool {
        self.status == MatchStatus::Called
    }

    /// Turn the match into a skipped one with the given reason.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = MatchStatus::Skipped;
        self.reason = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn lookout_deserializes_camel_case() {
        let lookout: Lookout = serde_json::from_value(json!({
            "intent": "create",
            "targetType": "event",
            "watchFor": ["meeting requests"],
            "fields": ["title", "start"]
        }))
        .unwrap();
        assert_eq!(lookout.intent, IntentKind::Create);
        assert!(lookout.source_text.is_none());
        assert!(lookout.is_for(IntentKind::Create, " Event"));
        assert!(!lookout.is_for(IntentKind::Update, "event"));
    }

    #[test]
    fn skip_sets_reason() {
        let mut m = IntentMatch {
            intent: IntentKind::Update,
            target_type: "issue".into(),
            status: MatchStatus::Called,
            reason: None,
            extracted_fields: Map::new(),
            payload_preview: PayloadPreview::default(),
        };
        m.skip("missing identifier");
        assert!(!m.is_called());
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["reason"], "missing identifier");
        assert!(json["payloadPreview"].get("notes").is_none());
    }
}
