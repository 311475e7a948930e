//! Run summaries.
//!
//! A [`RunReport`] is the compact, machine-readable account of one run:
//! what was called, skipped or failed and why. Raw action results never
//! appear in it.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::dispatcher::DispatchOutcome;
use crate::types::{IntentKind, MatchStatus, PayloadPreview};

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    ParseError,
    ProcessingError,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ParseError => "parse_error",
            Self::ProcessingError => "processing_error",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "parse_error" => Ok(Self::ParseError),
            "processing_error" => Ok(Self::ProcessingError),
            other => Err(format!("unknown run status `{other}`")),
        }
    }
}

/// Outcome of one match as reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Called,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportEntry {
    pub intent: IntentKind,
    pub target_type: String,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub payload_preview: PayloadPreview,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub called: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub document: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub entries: Vec<ReportEntry>,
    pub counts: Counts,
    /// Summary used in place of entries when the run did not complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// One report entry per outcome, plus the counts.
pub fn summarize(outcomes: &[DispatchOutcome]) -> (Vec<ReportEntry>, Counts) {
    let mut counts = Counts::default();
    let entries = outcomes
        .iter()
        .map(|o| {
            let m = &o.intent_match;
            let status = if o.error.is_some() {
                counts.failed += 1;
                EntryStatus::Failed
            } else if m.status == MatchStatus::Skipped {
                counts.skipped += 1;
                EntryStatus::Skipped
            } else {
                counts.called += 1;
                EntryStatus::Called
            };
            ReportEntry {
                intent: m.intent,
                target_type: m.target_type.clone(),
                status,
                reason: m.reason.clone(),
                action: o.action_name.clone(),
                error: o.error.as_ref().map(ToString::to_string),
                payload_preview: m.payload_preview.clone(),
            }
        })
        .collect();
    (entries, counts)
}

impl RunReport {
    /// Report for a run that went through every stage.
    pub fn success(
        run_id: impl Into<String>,
        document: impl Into<String>,
        outcomes: &[DispatchOutcome],
    ) -> Self {
        let (entries, counts) = summarize(outcomes);
        Self {
            run_id: run_id.into(),
            document: document.into(),
            status: RunStatus::Success,
            message: None,
            entries,
            counts,
            fallback: None,
        }
    }

    /// Report for a run that stopped early.
    pub fn failure(
        run_id: impl Into<String>,
        document: impl Into<String>,
        status: RunStatus,
        message: impl Into<String>,
    ) -> Self {
        let document = document.into();
        let message = message.into();
        let fallback = format!(
            "fallback extraction for {document} due to processing error: {message}"
        );
        Self {
            run_id: run_id.into(),
            document,
            status,
            message: Some(message),
            entries: Vec::new(),
            counts: Counts::default(),
            fallback: Some(fallback),
        }
    }

    /// Compact JSON rendering.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"runId":"{}","error":"unserializable report: {e}"}}"#, self.run_id)
        })
    }

    /// Human-readable rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} [{}] run {}", self.document, self.status, self.run_id);
        if let Some(fallback) = &self.fallback {
            let _ = writeln!(out, "  {fallback}");
            return out;
        }
        if self.entries.is_empty() {
            let _ = writeln!(out, "  nothing to do");
        }
        for entry in &self.entries {
            let label = match entry.status {
                EntryStatus::Called => "called ",
                EntryStatus::Skipped => "skipped",
                EntryStatus::Failed => "failed ",
            };
            let _ = write!(
                out,
                "  {label} {} {}: {}",
                entry.intent, entry.target_type, entry.payload_preview.title
            );
            if let Some(action) = &entry.action {
                let _ = write!(out, " -> {action}");
            }
            if let Some(detail) = entry.error.as_ref().or(entry.reason.as_ref()) {
                let _ = write!(out, " ({detail})");
            }
            out.push('\n');
            for note in &entry.payload_preview.notes {
                let _ = writeln!(out, "          note: {note}");
            }
        }
        let _ = writeln!(
            out,
            "  {} called, {} skipped, {} failed",
            self.counts.called, self.counts.skipped, self.counts.failed
        );
        out
    }
}
