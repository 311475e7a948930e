//! Field-name conventions and value helpers shared by the extractor and the
//! dispatcher.
//!
//! Models and providers spell the same field many ways (`startTime`,
//! `start_time`, `start-time`). Matching happens on the normalized key: ASCII
//! lowercase with `_`, `-` and whitespace removed.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta};
use regex::Regex;
use serde_json::{Map, Value};

const TITLE_KEYS: &[&str] = &["title", "summary", "name", "subject"];
const START_KEYS: &[&str] = &["start", "starttime", "startdatetime", "startdate", "startat"];
const END_KEYS: &[&str] = &["end", "endtime", "enddatetime", "enddate", "endat"];
const DURATION_KEYS: &[&str] = &[
    "duration",
    "durationminutes",
    "durationmins",
    "lengthminutes",
    "length",
];
const IDENTIFIER_KEYS: &[&str] = &[
    "id",
    "uid",
    "key",
    "number",
    "identifier",
    "ref",
    "reference",
    "idtoupdate",
];
/// Normalized suffixes that make `<target><suffix>` an identifier key.
const IDENTIFIER_SUFFIXES: &[&str] = &["id", "number", "ref", "reference"];

/// Groups of keys that name the same thing. The first entry is canonical.
const ALIAS_GROUPS: &[&[&str]] = &[
    TITLE_KEYS,
    &["description", "body", "details", "notes", "content"],
    START_KEYS,
    END_KEYS,
    &["attendees", "participants", "invitees", "guests"],
    &["assignees", "assignee", "owners"],
    &["labels", "tags"],
    &["duedate", "due", "deadline", "dueat"],
    &["location", "place", "venue", "where"],
    &["link", "url", "href"],
];

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Lowercase a key and strip separators.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '_' | '-') && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

pub fn is_title_key(key: &str) -> bool {
    TITLE_KEYS.contains(&normalize_key(key).as_str())
}

pub fn is_start_key(key: &str) -> bool {
    START_KEYS.contains(&normalize_key(key).as_str())
}

pub fn is_end_key(key: &str) -> bool {
    END_KEYS.contains(&normalize_key(key).as_str())
}

pub fn is_duration_key(key: &str) -> bool {
    DURATION_KEYS.contains(&normalize_key(key).as_str())
}

/// Whether `key` names the identity of an existing `target_type` entity:
/// a bare identifier key (`id`, `uid`, `number`) or one stemmed on the
/// target itself (`issueNumber` for an issue). `phoneNumber` is not.
pub fn is_identifier_key(key: &str, target_type: &str) -> bool {
    is_identifier_key_for(key, &[target_type])
}

/// Like [`is_identifier_key`], accepting any of several names for the
/// target (`eventId` for a meeting whose synonyms include `event`).
pub fn is_identifier_key_for<S: AsRef<str>>(key: &str, targets: &[S]) -> bool {
    let normalized = normalize_key(key);
    if IDENTIFIER_KEYS.contains(&normalized.as_str()) {
        return true;
    }
    IDENTIFIER_SUFFIXES
        .iter()
        .filter_map(|suffix| normalized.strip_suffix(suffix))
        .filter(|stem| !stem.is_empty())
        .any(|stem| targets.iter().any(|t| normalize_key(t.as_ref()) == stem))
}

/// The alias group a key belongs to, if any.
pub fn alias_group(key: &str) -> Option<&'static [&'static str]> {
    let normalized = normalize_key(key);
    ALIAS_GROUPS
        .iter()
        .copied()
        .find(|group| group.contains(&normalized.as_str()))
}

/// Whether two keys name the same thing.
pub fn keys_equivalent(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize_key(a), normalize_key(b));
    na == nb || alias_group(a).is_some_and(|group| group.contains(&nb.as_str()))
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Null or blank-string values carry no information.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// A scalar value rendered as text.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// The first non-blank field whose key satisfies `pred`.
pub fn find_field<'a>(
    fields: &'a Map<String, Value>,
    pred: impl Fn(&str) -> bool,
) -> Option<(&'a String, &'a Value)> {
    fields
        .iter()
        .find(|(key, value)| pred(key.as_str()) && !is_blank(value))
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A parsed point in time, keeping the precision it was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Zoned(DateTime<FixedOffset>),
    Local(NaiveDateTime),
    Date(NaiveDate),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
];

impl Temporal {
    /// Parse the date/time notations models commonly produce.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(Self::Zoned(dt));
        }
        if let Some(dt) = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        {
            return Some(Self::Local(dt));
        }
        NaiveDate::parse_from_str(text, "%Y-%m-%d").ok().map(Self::Date)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_str().and_then(Self::parse)
    }

    /// Shift by `minutes`. A bare date has no time of day and stays as is.
    /// `None` when the result falls outside the representable range.
    pub fn plus_minutes(self, minutes: i64) -> Option<Self> {
        let delta = TimeDelta::try_minutes(minutes)?;
        match self {
            Self::Zoned(dt) => dt.checked_add_signed(delta).map(Self::Zoned),
            Self::Local(dt) => dt.checked_add_signed(delta).map(Self::Local),
            Self::Date(d) => Some(Self::Date(d)),
        }
    }

    /// ISO-8601 rendering.
    pub fn to_iso(self) -> String {
        match self {
            Self::Zoned(dt) => dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            Self::Local(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

static DURATION_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:pt)?\s*(?:(\d+)\s*(?:h|hr|hrs|hour|hours))?\s*(?:(\d+)\s*(?:m|min|mins|minute|minutes))?$",
    )
    .ok()
});

/// Parse a duration into whole minutes.
///
/// Accepts bare numbers (minutes), `30m`, `1h`, `1h 30m`, `90 minutes` and
/// ISO-8601 `PT30M`. Zero and unparseable values yield `None`.
pub fn parse_duration_minutes(value: &Value) -> Option<i64> {
    let minutes = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64))?,
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                n
            } else {
                let caps = DURATION_RE.as_ref()?.captures(s)?;
                if caps.get(1).is_none() && caps.get(2).is_none() {
                    return None;
                }
                let hours: i64 = caps.get(1).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
                let mins: i64 = caps.get(2).map_or(Ok(0), |m| m.as_str().parse()).ok()?;
                hours.checked_mul(60)?.checked_add(mins)?
            }
        }
        _ => return None,
    };
    (minutes > 0).then_some(minutes)
}
