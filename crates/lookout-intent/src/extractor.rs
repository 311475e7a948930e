//! Document intent extraction.
//!
//! One model call proposes candidate matches for a document; every candidate
//! then goes through code-level enforcement so the output holds regardless
//! of what the model returned:
//!
//! - candidates must belong to a known lookout;
//! - blank values are dropped, fields follow the lookout's order;
//! - a missing end time is inferred from start + duration and noted;
//! - creates must carry their title, start and end; updates an identifier;
//!   otherwise the match is skipped with a reason;
//! - matches on the same entity collapse to the best fit.

use std::collections::HashMap;
use std::sync::Arc;

use lookout_agent::{StructuredGenerator, StructuredPrompt};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::document::Document;
use crate::error::{IntentError, Result, Stage};
use crate::fields::{self, Temporal};
use crate::prompts;
use crate::types::{IntentKind, IntentMatch, Lookout, MatchStatus, PayloadPreview};

/// Tunables for [`DocumentIntentExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Duration assumed for events with a start but no end.
    pub default_duration_minutes: i64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 30,
        }
    }
}

/// Finds lookout matches in documents.
#[derive(Clone)]
pub struct DocumentIntentExtractor {
    generator: Arc<dyn StructuredGenerator>,
    config: ExtractorConfig,
}

impl DocumentIntentExtractor {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self {
            generator,
            config: ExtractorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExtractorConfig) -> Self {
        self.config = config;
        self
    }

    /// Extract intent matches from `document`.
    ///
    /// No lookouts, or nothing to read, means no matches; the model is not
    /// consulted.
    pub async fn extract(
        &self,
        document: &Document,
        lookouts: &[Lookout],
    ) -> Result<Vec<IntentMatch>> {
        if lookouts.is_empty() || document.is_empty() {
            debug!(document = %document.name, "nothing to match");
            return Ok(Vec::new());
        }

        let prompt = StructuredPrompt::new(
            prompts::INTENT_SYSTEM_PROMPT,
            prompts::intent_user_prompt(document, lookouts),
        )
        .with_attachments(document.attachments());

        let value = self
            .generator
            .generate_structured(&prompt, &prompts::intent_schema())
            .await
            .map_err(|e| IntentError::generation(Stage::IntentExtraction, e))?;
        let candidates: Vec<Candidate> = serde_json::from_value(value)
            .map_err(|e| IntentError::generation(Stage::IntentExtraction, e))?;

        let proposed = candidates.len();
        let matches = enforce(candidates, lookouts, &self.config);
        info!(
            document = %document.name,
            proposed,
            matches = matches.len(),
            called = matches.iter().filter(|m| m.is_called()).count(),
            "intents extracted"
        );
        Ok(matches)
    }
}

/// A match as proposed by the model, before enforcement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub lookout_index: Option<usize>,
    pub intent: IntentKind,
    pub target_type: String,
    pub status: MatchStatus,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub extracted_fields: Map<String, Value>,
    #[serde(default)]
    pub payload_preview: PayloadPreview,
}

/// Why a match cannot be called. Never surfaces as an error: the match is
/// skipped with this as its reason.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("missing identifier of the {0} to update")]
    MissingIdentifier(String),
}

/// Apply every enforcement rule to the model's candidates.
pub fn enforce(
    candidates: Vec<Candidate>,
    lookouts: &[Lookout],
    config: &ExtractorConfig,
) -> Vec<IntentMatch> {
    let mut matches = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let Some(lookout) = resolve_lookout(&candidate, lookouts) else {
            debug!(
                intent = %candidate.intent,
                target_type = %candidate.target_type,
                "dropping candidate without a lookout"
            );
            continue;
        };

        let mut m = IntentMatch {
            intent: candidate.intent,
            target_type: lookout.target_type.clone(),
            status: candidate.status,
            reason: candidate.reason.filter(|r| !r.trim().is_empty()),
            extracted_fields: candidate
                .extracted_fields
                .into_iter()
                .filter(|(_, v)| !fields::is_blank(v))
                .collect(),
            payload_preview: candidate.payload_preview,
        };

        apply_temporal_defaults(&mut m, lookout, config);
        m.extracted_fields = reorder_fields(std::mem::take(&mut m.extracted_fields), lookout);

        if m.is_called()
            && let Err(violation) = validate(&m, lookout)
        {
            debug!(target_type = %m.target_type, %violation, "skipping match");
            m.skip(violation.to_string());
        }

        match m.status {
            MatchStatus::Called => m.reason = None,
            MatchStatus::Skipped => {
                if m.reason.is_none() {
                    m.reason = Some("skipped by the extractor without a stated reason".into());
                }
            }
        }

        fill_preview(&mut m);
        matches.push(m);
    }

    dedup_matches(matches)
}

fn resolve_lookout<'a>(candidate: &Candidate, lookouts: &'a [Lookout]) -> Option<&'a Lookout> {
    candidate
        .lookout_index
        .and_then(|i| lookouts.get(i))
        .filter(|l| l.is_for(candidate.intent, &candidate.target_type))
        .or_else(|| {
            lookouts
                .iter()
                .find(|l| l.is_for(candidate.intent, &candidate.target_type))
        })
}

// ---------------------------------------------------------------------------
// Fields
// ---------------------------------------------------------------------------

/// Lookout fields first, in lookout order; extras after, in model order.
fn reorder_fields(mut extracted: Map<String, Value>, lookout: &Lookout) -> Map<String, Value> {
    let mut ordered = Map::with_capacity(extracted.len());
    for wanted in &lookout.fields {
        let wanted_norm = fields::normalize_key(wanted);
        let key = extracted
            .keys()
            .find(|k| fields::normalize_key(k) == wanted_norm)
            .or_else(|| extracted.keys().find(|k| fields::keys_equivalent(k, wanted)))
            .cloned();
        if let Some(key) = key
            && let Some(value) = extracted.shift_remove(&key)
        {
            ordered.insert(key, value);
        }
    }
    ordered.extend(extracted);
    ordered
}

/// Normalize start/end values and infer a missing end.
fn apply_temporal_defaults(m: &mut IntentMatch, lookout: &Lookout, config: &ExtractorConfig) {
    for (key, value) in m.extracted_fields.iter_mut() {
        if (fields::is_start_key(key) || fields::is_end_key(key))
            && let Some(t) = Temporal::from_value(value)
        {
            *value = Value::String(t.to_iso());
        }
    }

    let Some(end_key) = lookout.fields.iter().find(|f| fields::is_end_key(f)) else {
        return;
    };
    if fields::find_field(&m.extracted_fields, fields::is_end_key).is_some() {
        return;
    }
    let Some(start) = fields::find_field(&m.extracted_fields, fields::is_start_key)
        .and_then(|(_, v)| Temporal::from_value(v))
    else {
        return;
    };

    let (minutes, from_document) =
        match fields::find_field(&m.extracted_fields, fields::is_duration_key)
            .and_then(|(_, v)| fields::parse_duration_minutes(v))
        {
            Some(minutes) => (minutes, true),
            None => (config.default_duration_minutes, false),
        };

    let Some(end) = start.plus_minutes(minutes) else {
        debug!(minutes, "duration out of range, end left unset");
        return;
    };
    m.extracted_fields
        .insert(end_key.clone(), Value::String(end.to_iso()));
    let note = if from_document {
        format!("{end_key} computed from start + {minutes}m")
    } else {
        format!("{end_key} defaulted to start + {minutes}m")
    };
    m.payload_preview.notes.push(note);
}

fn validate(m: &IntentMatch, lookout: &Lookout) -> std::result::Result<(), ValidationError> {
    let extracted = &m.extracted_fields;
    match m.intent {
        IntentKind::Create => {
            for declared in &lookout.fields {
                let present = if fields::is_title_key(declared) {
                    fields::find_field(extracted, fields::is_title_key).is_some()
                } else if fields::is_start_key(declared) {
                    fields::find_field(extracted, fields::is_start_key)
                        .and_then(|(_, v)| Temporal::from_value(v))
                        .is_some()
                } else if fields::is_end_key(declared) {
                    fields::find_field(extracted, fields::is_end_key).is_some()
                } else {
                    true
                };
                if !present {
                    return Err(ValidationError::MissingField(declared.clone()));
                }
            }
            Ok(())
        }
        IntentKind::Update => {
            if identifier_of(extracted, &m.target_type).is_some() {
                Ok(())
            } else {
                Err(ValidationError::MissingIdentifier(m.target_type.clone()))
            }
        }
    }
}

fn identifier_of(extracted: &Map<String, Value>, target_type: &str) -> Option<String> {
    extracted
        .iter()
        .filter(|(k, _)| fields::is_identifier_key(k, target_type))
        .find_map(|(_, v)| fields::value_text(v).filter(|s| !s.is_empty()))
}

fn title_of(extracted: &Map<String, Value>) -> Option<String> {
    fields::find_field(extracted, fields::is_title_key).and_then(|(_, v)| fields::value_text(v))
}

fn fill_preview(m: &mut IntentMatch) {
    if m.payload_preview.title.trim().is_empty() {
        m.payload_preview.title =
            title_of(&m.extracted_fields).unwrap_or_else(|| m.target_type.clone());
    }
    if m.payload_preview.key_fields.is_empty() {
        m.payload_preview.key_fields = m.extracted_fields.keys().cloned().collect();
    }
}

// ---------------------------------------------------------------------------
// Dedup
// ---------------------------------------------------------------------------

/// How a match names its entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntityRef {
    /// An explicit identifier names exactly one entity.
    Id(String),
    /// A title alone is ambiguous; other fields tell same-titled entities
    /// apart.
    Title(String),
}

fn entity_reference(m: &IntentMatch) -> Option<EntityRef> {
    identifier_of(&m.extracted_fields, &m.target_type)
        .map(|id| EntityRef::Id(id.trim_start_matches('#').to_lowercase()))
        .or_else(|| {
            title_of(&m.extracted_fields)
                .map(|t| normalize_text(&t))
                .filter(|t| !t.is_empty())
                .map(EntityRef::Title)
        })
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether two same-titled matches can be the same entity: every non-title
/// field both carry has the same value.
fn compatible(a: &IntentMatch, b: &IntentMatch) -> bool {
    a.extracted_fields
        .iter()
        .filter(|(key, _)| !fields::is_title_key(key))
        .all(|(key, value)| {
            let other = b
                .extracted_fields
                .iter()
                .find(|(k, _)| fields::keys_equivalent(k, key))
                .map(|(_, v)| v);
            match other {
                None => true,
                Some(other) => same_value(value, other),
            }
        })
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (fields::value_text(a), fields::value_text(b)) {
        (Some(x), Some(y)) => normalize_text(&x) == normalize_text(&y),
        _ => a == b,
    }
}

fn better(candidate: &IntentMatch, current: &IntentMatch) -> bool {
    match (candidate.is_called(), current.is_called()) {
        (true, false) => true,
        (false, true) => false,
        _ => candidate.extracted_fields.len() > current.extracted_fields.len(),
    }
}

/// Collapse matches on the same entity into the best fit, keeping the
/// position of the first occurrence. Matches sharing only a title merge
/// when none of their common fields disagree.
fn dedup_matches(matches: Vec<IntentMatch>) -> Vec<IntentMatch> {
    let mut out: Vec<IntentMatch> = Vec::with_capacity(matches.len());
    let mut seen: HashMap<(IntentKind, String, EntityRef), Vec<usize>> = HashMap::new();

    for m in matches {
        let Some(reference) = entity_reference(&m) else {
            out.push(m);
            continue;
        };
        let by_title = matches!(reference, EntityRef::Title(_));
        let key = (m.intent, m.target_type.to_lowercase(), reference);
        let slots = seen.entry(key).or_default();
        let existing = slots
            .iter()
            .copied()
            .find(|&i| !by_title || compatible(&m, &out[i]));
        match existing {
            Some(index) => {
                if better(&m, &out[index]) {
                    out[index] = m;
                }
            }
            None => {
                slots.push(out.len());
                out.push(m);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event_lookout() -> Lookout {
        Lookout {
            intent: IntentKind::Create,
            target_type: "event".into(),
            watch_for: vec!["schedule".into()],
            fields: vec!["title".into(), "start".into(), "end".into(), "attendees".into()],
            source_text: None,
        }
    }

    fn issue_update_lookout() -> Lookout {
        Lookout {
            intent: IntentKind::Update,
            target_type: "issue".into(),
            watch_for: vec!["close the bug".into()],
            fields: vec!["idToUpdate".into(), "state".into()],
            source_text: None,
        }
    }

    fn candidate(value: Value) -> Candidate {
        serde_json::from_value(value).unwrap()
    }

    fn run(candidates: Vec<Value>, lookouts: &[Lookout]) -> Vec<IntentMatch> {
        enforce(
            candidates.into_iter().map(candidate).collect(),
            lookouts,
            &ExtractorConfig::default(),
        )
    }

    #[test]
    fn infers_end_and_orders_fields() {
        let out = run(
            vec![json!({
                "intent": "create",
                "targetType": "event",
                "status": "called",
                "extractedFields": {
                    "attendees": ["Alex"],
                    "location": null,
                    "start": "2025-03-01 10:00",
                    "title": "Meeting with Alex"
                }
            })],
            &[event_lookout()],
        );
        assert_eq!(out.len(), 1);
        let m = &out[0];
        assert!(m.is_called());
        let keys: Vec<&str> = m.extracted_fields.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["title", "start", "end", "attendees"]);
        assert_eq!(m.extracted_fields["start"], "2025-03-01T10:00:00");
        assert_eq!(m.extracted_fields["end"], "2025-03-01T10:30:00");
        assert_eq!(m.payload_preview.notes, vec!["end defaulted to start + 30m"]);
        assert_eq!(m.payload_preview.title, "Meeting with Alex");
        assert_eq!(m.payload_preview.key_fields.len(), 4);
    }

    #[test]
    fn explicit_duration_wins_over_default() {
        let out = run(
            vec![json!({
                "intent": "create",
                "targetType": "event",
                "status": "called",
                "extractedFields": {
                    "title": "Review",
                    "start": "2025-03-01T09:00",
                    "durationMinutes": 45
                }
            })],
            &[event_lookout()],
        );
        assert_eq!(out[0].extracted_fields["end"], "2025-03-01T09:45:00");
    }

    #[test]
    fn create_without_title_is_skipped() {
        let out = run(
            vec![json!({
                "intent": "create",
                "targetType": "event",
                "status": "called",
                "extractedFields": {"start": "2025-03-01T09:00"}
            })],
            &[event_lookout()],
        );
        assert_eq!(out[0].status, MatchStatus::Skipped);
        assert_eq!(out[0].reason.as_deref(), Some("missing required field `title`"));
    }

    #[test]
    fn create_with_unparseable_start_is_skipped() {
        let out = run(
            vec![json!({
                "intent": "create",
                "targetType": "event",
                "status": "called",
                "extractedFields": {"title": "Sync", "start": "sometime next week"}
            })],
            &[event_lookout()],
        );
        assert_eq!(out[0].status, MatchStatus::Skipped);
    }

    #[test]
    fn update_needs_identifier() {
        let lookouts = [issue_update_lookout()];
        let out = run(
            vec![
                json!({
                    "intent": "update", "targetType": "issue", "status": "called",
                    "extractedFields": {"state": "closed"}
                }),
                json!({
                    "intent": "update", "targetType": "issue", "status": "called",
                    "extractedFields": {"idToUpdate": "#42", "state": "closed"}
                }),
            ],
            &lookouts,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].status, MatchStatus::Skipped);
        assert!(out[0].reason.as_deref().unwrap().contains("identifier"));
        assert!(out[1].is_called());
        assert!(out[1].reason.is_none());
    }

    #[test]
    fn unknown_targets_are_dropped() {
        let out = run(
            vec![json!({"intent": "create", "targetType": "contact", "status": "called"})],
            &[event_lookout()],
        );
        assert!(out.is_empty());
    }

    #[test]
    fn mismatched_lookout_index_falls_back_to_type() {
        let lookouts = [issue_update_lookout(), event_lookout()];
        let out = run(
            vec![json!({
                "lookoutIndex": 0, "intent": "create", "targetType": "Event", "status": "called",
                "extractedFields": {"title": "Sync", "start": "2025-03-01T09:00", "end": "2025-03-01T09:15"}
            })],
            &lookouts,
        );
        assert_eq!(out[0].target_type, "event");
        assert!(out[0].payload_preview.notes.is_empty());
    }

    #[test]
    fn skipped_without_reason_gets_one() {
        let out = run(
            vec![json!({"intent": "create", "targetType": "event", "status": "skipped"})],
            &[event_lookout()],
        );
        assert!(!out[0].reason.as_deref().unwrap().is_empty());
        assert_eq!(out[0].payload_preview.title, "event");
    }

    #[test]
    fn duplicates_keep_best_fit() {
        let out = run(
            vec![
                json!({
                    "intent": "create", "targetType": "event", "status": "skipped",
                    "reason": "unsure", "extractedFields": {"title": "Team  Sync"}
                }),
                json!({
                    "intent": "create", "targetType": "event", "status": "called",
                    "extractedFields": {"summary": "team sync", "start": "2025-03-01T09:00"}
                }),
                json!({
                    "intent": "create", "targetType": "event", "status": "called",
                    "extractedFields": {"title": "Retro", "start": "2025-03-02T09:00"}
                }),
            ],
            &[event_lookout()],
        );
        assert_eq!(out.len(), 2);
        assert!(out[0].is_called());
        assert_eq!(out[0].extracted_fields["summary"], "team sync");
        assert_eq!(out[1].payload_preview.title, "Retro");
    }

    #[test]
    fn same_title_on_different_starts_stays_separate() {
        let out = run(
            vec![
                json!({
                    "intent": "create", "targetType": "event", "status": "called",
                    "extractedFields": {"title": "Standup", "start": "2025-03-03T09:00"}
                }),
                json!({
                    "intent": "create", "targetType": "event", "status": "called",
                    "extractedFields": {"title": "Standup", "start": "2025-03-04T09:00"}
                }),
            ],
            &[event_lookout()],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].extracted_fields["start"], "2025-03-03T09:00:00");
        assert_eq!(out[1].extracted_fields["start"], "2025-03-04T09:00:00");
        assert!(out.iter().all(IntentMatch::is_called));
    }

    #[test]
    fn same_title_and_start_still_merge() {
        let out = run(
            vec![
                json!({
                    "intent": "create", "targetType": "event", "status": "called",
                    "extractedFields": {"title": "Standup", "start": "2025-03-03 09:00"}
                }),
                json!({
                    "intent": "create", "targetType": "event", "status": "called",
                    "extractedFields": {
                        "title": "standup", "start": "2025-03-03T09:00", "attendees": ["Sam"]
                    }
                }),
            ],
            &[event_lookout()],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].extracted_fields["attendees"], json!(["Sam"]));
    }

    #[test]
    fn out_of_range_duration_is_skipped() {
        let out = run(
            vec![json!({
                "intent": "create", "targetType": "event", "status": "called",
                "extractedFields": {
                    "title": "X", "start": "2025-03-03T09:00",
                    "durationMinutes": "9999999999999999"
                }
            })],
            &[event_lookout()],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].status, MatchStatus::Skipped);
        assert_eq!(out[0].reason.as_deref(), Some("missing required field `end`"));
        assert!(!out[0].extracted_fields.contains_key("end"));
    }

    #[test]
    fn negative_duration_falls_back_to_default() {
        let out = run(
            vec![json!({
                "intent": "create", "targetType": "event", "status": "called",
                "extractedFields": {"title": "X", "start": "2025-03-03T09:00", "durationMinutes": -45}
            })],
            &[event_lookout()],
        );
        assert!(out[0].is_called());
        assert_eq!(out[0].extracted_fields["end"], "2025-03-03T09:30:00");
        assert_eq!(out[0].payload_preview.notes, vec!["end defaulted to start + 30m"]);
    }

    #[test]
    fn unrelated_number_fields_are_not_identifiers() {
        let out = run(
            vec![
                json!({
                    "intent": "update", "targetType": "issue", "status": "called",
                    "extractedFields": {"phoneNumber": "555-0100", "state": "closed"}
                }),
                json!({
                    "intent": "update", "targetType": "issue", "status": "called",
                    "extractedFields": {"issueNumber": 42, "state": "closed"}
                }),
            ],
            &[issue_update_lookout()],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].status, MatchStatus::Skipped);
        assert!(out[1].is_called());
    }

    #[test]
    fn matches_without_reference_are_not_merged() {
        let out = run(
            vec![
                json!({"intent": "create", "targetType": "event", "status": "skipped", "reason": "a"}),
                json!({"intent": "create", "targetType": "event", "status": "skipped", "reason": "b"}),
            ],
            &[event_lookout()],
        );
        assert_eq!(out.len(), 2);
    }
}
