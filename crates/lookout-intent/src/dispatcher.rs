//! Dispatch of intent matches to concrete actions.
//!
//! For every `called` match the dispatcher picks the best-fitting catalog
//! action, builds its payload strictly from the extracted fields, validates
//! it against the action's input schema and invokes it once. Invocations
//! for distinct matches run concurrently; outcomes come back in input order
//! and a failing action only affects its own outcome.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use lookout_adapters::{ActionCatalog, ActionDescriptor};
use lookout_agent::{AgentError, OutputValidator};
use serde::Serialize;
use serde_json::{Map, Number, Value};
use tracing::{debug, info, warn};

use crate::fields;
use crate::types::{IntentKind, IntentMatch};

const CREATE_VERBS: &[&str] = &["create", "add", "new", "schedule", "insert", "open", "make"];
const UPDATE_VERBS: &[&str] = &[
    "update",
    "edit",
    "modify",
    "patch",
    "change",
    "reschedule",
    "rename",
    "set",
];
/// Read-only or destructive verbs never serve a create or update.
const EXCLUDED_VERBS: &[&str] = &[
    "list", "get", "search", "find", "delete", "remove", "read", "fetch",
];

/// Target type -> words that name the same kind of entity.
const TARGET_SYNONYMS: &[(&str, &[&str])] = &[
    ("event", &["calendar", "meeting", "appointment"]),
    ("issue", &["bug", "ticket", "task"]),
    ("task", &["todo", "issue"]),
    ("reminder", &["alarm", "todo"]),
    ("doc", &["document", "page", "note"]),
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum number of actions in flight at once.
    pub concurrency: usize,
    /// Bound on a single action invocation.
    pub action_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            action_timeout: Duration::from_secs(30),
        }
    }
}

/// Why a called match produced no result. Local to its outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionInvocationError {
    #[error("no action can {intent} a `{target_type}`")]
    NoMatchingAction {
        intent: IntentKind,
        target_type: String,
    },

    #[error("payload for `{action}` is invalid: {reason}")]
    InvalidPayload { action: String, reason: String },

    #[error("action `{action}` failed: {reason}")]
    Failed { action: String, reason: String },

    #[error("action `{action}` timed out after {seconds}s")]
    Timeout { action: String, seconds: u64 },
}

/// What happened to one match.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    #[serde(rename = "match")]
    pub intent_match: IntentMatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ActionInvocationError>,
}

impl DispatchOutcome {
    fn untouched(intent_match: IntentMatch) -> Self {
        Self {
            intent_match,
            action_name: None,
            result: None,
            error: None,
        }
    }

    fn failed(
        intent_match: IntentMatch,
        action_name: Option<String>,
        error: ActionInvocationError,
    ) -> Self {
        Self {
            intent_match,
            action_name,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Executes called matches through an [`ActionCatalog`].
#[derive(Debug, Clone)]
pub struct Dispatcher {
    catalog: Arc<ActionCatalog>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(catalog: Arc<ActionCatalog>, config: DispatchConfig) -> Self {
        Self { catalog, config }
    }

    /// Produce one outcome per match, in input order.
    pub async fn dispatch(&self, matches: Vec<IntentMatch>) -> Vec<DispatchOutcome> {
        let outcomes: Vec<DispatchOutcome> = stream::iter(matches)
            .map(|m| self.dispatch_one(m))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        info!(
            outcomes = outcomes.len(),
            invoked = outcomes.iter().filter(|o| o.result.is_some()).count(),
            failed = outcomes.iter().filter(|o| o.is_failed()).count(),
            "dispatch complete"
        );
        outcomes
    }

    async fn dispatch_one(&self, m: IntentMatch) -> DispatchOutcome {
        if !m.is_called() {
            return DispatchOutcome::untouched(m);
        }

        let Some(descriptor) = select_action(self.catalog.list_actions(), &m) else {
            warn!(intent = %m.intent, target_type = %m.target_type, "no matching action");
            let error = ActionInvocationError::NoMatchingAction {
                intent: m.intent,
                target_type: m.target_type.clone(),
            };
            return DispatchOutcome::failed(m, None, error);
        };
        let action = descriptor.name.clone();

        let payload = build_payload(descriptor, &m.target_type, &m.extracted_fields);
        let payload = Value::Object(payload);
        if let Err(reason) = validate_payload(descriptor, &payload) {
            warn!(action = %action, %reason, "payload rejected before invocation");
            let error = ActionInvocationError::InvalidPayload {
                action: action.clone(),
                reason,
            };
            return DispatchOutcome::failed(m, Some(action), error);
        }

        debug!(action = %action, payload = %payload, "invoking");
        let timeout = self.config.action_timeout;
        match tokio::time::timeout(timeout, self.catalog.invoke(&action, payload)).await {
            Ok(Ok(result)) => {
                info!(action = %action, target_type = %m.target_type, "action invoked");
                DispatchOutcome {
                    intent_match: m,
                    action_name: Some(action),
                    result: Some(result),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                warn!(action = %action, error = %e, "action failed");
                let error = ActionInvocationError::Failed {
                    action: action.clone(),
                    reason: e.to_string(),
                };
                DispatchOutcome::failed(m, Some(action), error)
            }
            Err(_) => {
                warn!(action = %action, timeout_secs = timeout.as_secs(), "action timed out");
                let error = ActionInvocationError::Timeout {
                    action: action.clone(),
                    seconds: timeout.as_secs(),
                };
                DispatchOutcome::failed(m, Some(action), error)
            }
        }
    }
}

fn validate_payload(descriptor: &ActionDescriptor, payload: &Value) -> Result<(), String> {
    OutputValidator::new(&descriptor.input_schema)
        .and_then(|validator| validator.validate(payload))
        .map_err(|e| match e {
            AgentError::SchemaViolation { violations } => violations.join("; "),
            other => other.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Action selection
// ---------------------------------------------------------------------------

/// Split an identifier into lowercase words on separators and camelCase.
fn tokenize(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in name.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn target_words(target_type: &str) -> Vec<String> {
    let target = target_type.trim().to_lowercase();
    let singular = target.strip_suffix('s').unwrap_or(&target).to_owned();
    let mut words = vec![target.clone()];
    if singular != target {
        words.push(singular.clone());
    }
    for (key, synonyms) in TARGET_SYNONYMS {
        let related = *key == singular || synonyms.contains(&singular.as_str());
        if !related {
            continue;
        }
        for word in std::iter::once(*key).chain(synonyms.iter().copied()) {
            if !words.iter().any(|w| w == word) {
                words.push(word.to_owned());
            }
        }
    }
    words
}

fn contains_any(words: &[String], wanted: &[impl AsRef<str>]) -> bool {
    wanted
        .iter()
        .any(|w| words.iter().any(|x| x == w.as_ref() || x.strip_suffix('s') == Some(w.as_ref())))
}

/// Score `descriptor` for `m`; `None` when it cannot serve the match.
fn score(descriptor: &ActionDescriptor, m: &IntentMatch) -> Option<u32> {
    let name_words = tokenize(&descriptor.name);
    let desc_words = tokenize(&descriptor.description);

    if contains_any(&name_words, EXCLUDED_VERBS) {
        return None;
    }
    let (verbs, opposite) = match m.intent {
        IntentKind::Create => (CREATE_VERBS, UPDATE_VERBS),
        IntentKind::Update => (UPDATE_VERBS, CREATE_VERBS),
    };
    let verb_in_name = contains_any(&name_words, verbs);
    if !verb_in_name && (contains_any(&name_words, opposite) || !contains_any(&desc_words, verbs)) {
        return None;
    }

    let targets = target_words(&m.target_type);
    let target_in_name = contains_any(&name_words, targets.as_slice());
    let target_in_desc = contains_any(&desc_words, targets.as_slice());
    if !target_in_name && !target_in_desc {
        return None;
    }

    let properties = descriptor.properties();
    let mapped = m
        .extracted_fields
        .keys()
        .filter(|k| map_key(k, &targets, &properties).is_some())
        .count() as u32;

    let mut total = mapped;
    if target_in_name {
        total += 4;
    }
    if target_in_desc {
        total += 1;
    }
    if verb_in_name {
        total += 2;
    }
    Some(total)
}

/// Pick the action that best serves a called match.
///
/// Ties go to the action with fewer schema properties, then to catalog order.
pub fn select_action<'a>(
    actions: &'a [ActionDescriptor],
    m: &IntentMatch,
) -> Option<&'a ActionDescriptor> {
    let mut best: Option<(&ActionDescriptor, u32, usize)> = None;
    for descriptor in actions {
        let Some(s) = score(descriptor, m) else {
            continue;
        };
        let props = descriptor.properties().len();
        let wins = match best {
            None => true,
            Some((_, best_score, best_props)) => {
                s > best_score || (s == best_score && props < best_props)
            }
        };
        if wins {
            best = Some((descriptor, s, props));
        }
    }
    if let Some((d, s, _)) = best {
        debug!(action = %d.name, score = s, target_type = %m.target_type, "action selected");
    }
    best.map(|(d, _, _)| d)
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// The schema property a field maps to, ignoring whether it is set already.
fn map_key<'p>(key: &str, targets: &[String], properties: &[&'p str]) -> Option<&'p str> {
    direct_property(key, properties).or_else(|| alias_property(key, targets, properties, |_| true))
}

fn direct_property<'p>(key: &str, properties: &[&'p str]) -> Option<&'p str> {
    properties.iter().copied().find(|p| *p == key).or_else(|| {
        let norm = fields::normalize_key(key);
        properties
            .iter()
            .copied()
            .find(|p| fields::normalize_key(p) == norm)
    })
}

fn alias_property<'p>(
    key: &str,
    targets: &[String],
    properties: &[&'p str],
    is_free: impl Fn(&str) -> bool,
) -> Option<&'p str> {
    if fields::is_identifier_key_for(key, targets) {
        return properties
            .iter()
            .copied()
            .find(|p| fields::is_identifier_key_for(p, targets) && is_free(p));
    }
    properties
        .iter()
        .copied()
        .find(|p| fields::keys_equivalent(key, p) && is_free(p))
}

/// Build an action payload from extracted fields.
///
/// Fields matching a property pass through; the rest map through the alias
/// table onto properties that are still unset. Anything else is dropped.
/// Values are coerced to the property's declared type where unambiguous.
pub fn build_payload(
    descriptor: &ActionDescriptor,
    target_type: &str,
    extracted: &Map<String, Value>,
) -> Map<String, Value> {
    let properties = descriptor.properties();
    let targets = target_words(target_type);
    let mut payload = Map::new();
    let mut pending = Vec::new();

    for (key, value) in extracted {
        match direct_property(key, &properties) {
            Some(p) if !payload.contains_key(p) => {
                payload.insert(p.to_owned(), value.clone());
            }
            _ => pending.push((key, value)),
        }
    }
    for (key, value) in pending {
        let target = alias_property(key, &targets, &properties, |p| !payload.contains_key(p));
        match target {
            Some(p) => {
                payload.insert(p.to_owned(), value.clone());
            }
            None => debug!(action = %descriptor.name, field = %key, "dropping unmappable field"),
        }
    }

    for (property, value) in payload.iter_mut() {
        if let Some(ty) = descriptor.property_type(property)
            && let Some(coerced) = coerce(value, ty)
        {
            *value = coerced;
        }
    }
    payload
}

/// Convert `value` to JSON type `ty` when the conversion is unambiguous.
fn coerce(value: &Value, ty: &str) -> Option<Value> {
    match (ty, value) {
        ("array", Value::String(s)) => Some(Value::Array(
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(|part| Value::String(part.to_owned()))
                .collect(),
        )),
        ("array", Value::Number(_) | Value::Bool(_)) => Some(Value::Array(vec![value.clone()])),
        ("integer", Value::String(s)) => s
            .trim()
            .trim_start_matches('#')
            .parse::<i64>()
            .ok()
            .map(Value::from),
        ("integer", Value::Number(n)) if n.as_i64().is_none() => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64)),
        ("number", Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        ("string", Value::Array(items)) => {
            let parts: Option<Vec<String>> = items.iter().map(fields::value_text).collect();
            parts.map(|p| Value::String(p.join(", ")))
        }
        ("string", Value::Number(_) | Value::Bool(_)) => fields::value_text(value).map(Value::String),
        ("boolean", Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(Value::Bool(true)),
            "false" | "no" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}
