//! Lookout extraction.
//!
//! Turns the action catalog into a short, tool-agnostic list of [`Lookout`]s
//! with a single model call, then enforces in code what the prompt asks
//! for: no action names anywhere in a lookout, and no overlapping
//! duplicates.

use std::sync::Arc;

use aho_corasick::AhoCorasick;
use lookout_adapters::ActionDescriptor;
use lookout_agent::{StructuredGenerator, StructuredPrompt};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::error::{IntentError, Result, Stage};
use crate::prompts;
use crate::types::Lookout;

/// Derives lookouts from an action catalog.
#[derive(Clone)]
pub struct LookoutExtractor {
    generator: Arc<dyn StructuredGenerator>,
}

impl LookoutExtractor {
    pub fn new(generator: Arc<dyn StructuredGenerator>) -> Self {
        Self { generator }
    }

    /// Extract the lookouts for `actions`.
    ///
    /// An empty catalog yields no lookouts without consulting the model.
    /// Model failures and schema-invalid output are generation errors; no
    /// fallback lookouts are made up.
    pub async fn extract(&self, actions: &[ActionDescriptor]) -> Result<Vec<Lookout>> {
        if actions.is_empty() {
            debug!("empty catalog, no lookouts");
            return Ok(Vec::new());
        }

        let prompt = StructuredPrompt::new(
            prompts::LOOKOUT_SYSTEM_PROMPT,
            prompts::lookout_user_prompt(&condense_actions(actions)),
        );
        let value = self
            .generator
            .generate_structured(&prompt, &prompts::lookout_schema())
            .await
            .map_err(|e| IntentError::generation(Stage::LookoutExtraction, e))?;
        let raw: Vec<Lookout> = serde_json::from_value(value)
            .map_err(|e| IntentError::generation(Stage::LookoutExtraction, e))?;

        let raw_count = raw.len();
        let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
        let lookouts = merge_duplicates(sanitize(raw, &names));

        info!(
            actions = actions.len(),
            proposed = raw_count,
            lookouts = lookouts.len(),
            "lookouts extracted"
        );
        Ok(lookouts)
    }
}

/// Condense descriptors to `{name, description, parameters}` with the
/// schema serialized as text.
pub fn condense_actions(actions: &[ActionDescriptor]) -> Value {
    Value::Array(
        actions
            .iter()
            .map(|a| {
                json!({
                    "name": a.name,
                    "description": a.description,
                    "parameters": a.input_schema.to_string(),
                })
            })
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Post-processing
// ---------------------------------------------------------------------------

/// Remove action names, blank and repeated entries; drop lookouts left with
/// nothing to watch for.
pub fn sanitize(lookouts: Vec<Lookout>, action_names: &[&str]) -> Vec<Lookout> {
    let names: Vec<&str> = action_names
        .iter()
        .copied()
        .filter(|n| !n.is_empty())
        .collect();
    let matcher = if names.is_empty() {
        None
    } else {
        match AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&names)
        {
            Ok(ac) => Some(ac),
            Err(e) => {
                warn!(error = %e, "failed to build action-name matcher");
                None
            }
        }
    };
    let mentions_action = |entry: &str| match &matcher {
        Some(ac) => ac.is_match(entry),
        None => {
            let lowered = entry.to_lowercase();
            names.iter().any(|n| lowered.contains(&n.to_lowercase()))
        }
    };
    let clean = |entries: Vec<String>| -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(entries.len());
        for entry in entries {
            let entry = entry.trim();
            if entry.is_empty() || mentions_action(entry) {
                continue;
            }
            if !out.iter().any(|e| e.eq_ignore_ascii_case(entry)) {
                out.push(entry.to_owned());
            }
        }
        out
    };

    lookouts
        .into_iter()
        .filter_map(|mut lookout| {
            lookout.target_type = lookout.target_type.trim().to_owned();
            lookout.watch_for = clean(std::mem::take(&mut lookout.watch_for));
            lookout.fields = clean(std::mem::take(&mut lookout.fields));
            lookout.source_text = lookout
                .source_text
                .take()
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty() && !mentions_action(s));

            if lookout.watch_for.is_empty() || lookout.target_type.is_empty() {
                debug!(target_type = %lookout.target_type, "dropping lookout with nothing to watch for");
                return None;
            }
            Some(lookout)
        })
        .collect()
}

/// Merge lookouts with the same intent and target type whose `watch_for`
/// lists overlap. Merging is transitive and keeps first-seen order.
pub fn merge_duplicates(lookouts: Vec<Lookout>) -> Vec<Lookout> {
    let mut merged: Vec<Lookout> = Vec::with_capacity(lookouts.len());

    for lookout in lookouts {
        let overlapping: Vec<usize> = merged
            .iter()
            .enumerate()
            .filter(|(_, existing)| overlaps(existing, &lookout))
            .map(|(i, _)| i)
            .collect();

        let Some((&first, rest)) = overlapping.split_first() else {
            merged.push(lookout);
            continue;
        };

        // A bridging lookout joins groups that were separate until now.
        let mut joined: Vec<Lookout> = rest.iter().rev().map(|&i| merged.remove(i)).collect();
        joined.reverse();
        for other in joined {
            absorb(&mut merged[first], other);
        }
        absorb(&mut merged[first], lookout);
    }

    merged
}

fn overlaps(a: &Lookout, b: &Lookout) -> bool {
    a.intent == b.intent
        && a.target_type.eq_ignore_ascii_case(&b.target_type)
        && a.watch_for
            .iter()
            .any(|x| b.watch_for.iter().any(|y| x.eq_ignore_ascii_case(y)))
}

fn absorb(into: &mut Lookout, other: Lookout) {
    union_into(&mut into.watch_for, other.watch_for);
    union_into(&mut into.fields, other.fields);
    if into.source_text.is_none() {
        into.source_text = other.source_text;
    }
}

fn union_into(into: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !into.iter().any(|e| e.eq_ignore_ascii_case(&item)) {
            into.push(item);
        }
    }
}
