//! Calendar provider -- create and update events via CalDAV.
//!
//! Works against any CalDAV server (Nextcloud, Radicale, Fastmail, Google
//! via CalDAV ...). Events are stored as one iCalendar (RFC 5545) object per
//! UID at `{caldav_url}/{uid}.ics`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AdapterError, Result};
use crate::traits::{ActionDescriptor, ActionProvider, AuthRequirement, HealthStatus, ProviderKind};

const CREATE_EVENT: &str = "calendar_create_event";
const UPDATE_EVENT: &str = "calendar_update_event";

/// The fields of a VEVENT the provider reads and writes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFields {
    pub summary: String,
    /// ISO 8601 or an already formatted iCalendar date-time.
    pub start: String,
    pub end: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
}

impl EventFields {
    /// Build from a parsed VEVENT (see [`CalendarProvider::parse_ical_events`]).
    fn from_parsed(event: &Value) -> Self {
        let text = |key: &str| event.get(key).and_then(Value::as_str).map(str::to_owned);
        Self {
            summary: text("summary").unwrap_or_default(),
            start: text("dtstart").unwrap_or_default(),
            end: text("dtend").unwrap_or_default(),
            description: text("description"),
            location: text("location"),
            attendees: string_list(event.get("attendee")),
        }
    }

    /// Overlay the fields present in an update payload.
    fn apply_patch(&mut self, patch: &Value) {
        let text = |key: &str| {
            patch
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        if let Some(v) = text("summary") {
            self.summary = v;
        }
        if let Some(v) = text("start") {
            self.start = v;
        }
        if let Some(v) = text("end") {
            self.end = v;
        }
        if let Some(v) = text("description") {
            self.description = Some(v);
        }
        if let Some(v) = text("location") {
            self.location = Some(v);
        }
        if patch.get("attendees").is_some() {
            self.attendees = string_list(patch.get("attendees"));
        }
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Calendar provider using CalDAV.
pub struct CalendarProvider {
    id: String,
    connected: bool,
    caldav_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    client: reqwest::Client,
}

impl CalendarProvider {
    /// Create a provider without a server; it reports `Degraded` until one
    /// is configured.
    pub fn new(id: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("lookout/0.1")
            .build()
            .unwrap_or_default();

        Self {
            id: id.into(),
            connected: false,
            caldav_url: None,
            username: None,
            password: None,
            client,
        }
    }

    /// Create a provider with CalDAV credentials.
    pub fn with_caldav(
        id: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let mut provider = Self::new(id);
        provider.caldav_url = Some(url.into());
        provider.username = Some(username.into());
        provider.password = Some(password.into());
        provider
    }

    fn caldav_url(&self, action: &str) -> Result<&str> {
        self.caldav_url
            .as_deref()
            .ok_or_else(|| AdapterError::ExecutionFailed {
                action: action.into(),
                reason: "no CalDAV URL configured".into(),
            })
    }

    fn event_url(&self, action: &str, uid: &str) -> Result<String> {
        Ok(format!(
            "{}/{}.ics",
            self.caldav_url(action)?.trim_end_matches('/'),
            uid
        ))
    }

    // -----------------------------------------------------------------------
    // iCalendar helpers (RFC 5545)
    // -----------------------------------------------------------------------

    /// Render a VCALENDAR containing a single VEVENT.
    pub fn generate_ical_event(uid: &str, event: &EventFields) -> String {
        let mut ical = String::with_capacity(512);
        ical.push_str("BEGIN:VCALENDAR\r\n");
        ical.push_str("VERSION:2.0\r\n");
        ical.push_str("PRODID:-//Lookout//Calendar//EN\r\n");
        ical.push_str("BEGIN:VEVENT\r\n");
        ical.push_str(&format!("UID:{uid}\r\n"));
        ical.push_str(&format!(
            "DTSTAMP:{}\r\n",
            chrono::Utc::now().format("%Y%m%dT%H%M%SZ")
        ));
        ical.push_str(&format!("DTSTART:{}\r\n", Self::format_ical_datetime(&event.start)));
        ical.push_str(&format!("DTEND:{}\r\n", Self::format_ical_datetime(&event.end)));
        ical.push_str(&format!("SUMMARY:{}\r\n", escape_text(&event.summary)));
        if let Some(desc) = &event.description {
            ical.push_str(&format!("DESCRIPTION:{}\r\n", escape_text(desc)));
        }
        if let Some(loc) = &event.location {
            ical.push_str(&format!("LOCATION:{}\r\n", escape_text(loc)));
        }
        for attendee in &event.attendees {
            let address = attendee.strip_prefix("mailto:").unwrap_or(attendee);
            ical.push_str(&format!("ATTENDEE:mailto:{address}\r\n"));
        }
        ical.push_str("END:VEVENT\r\n");
        ical.push_str("END:VCALENDAR\r\n");
        ical
    }

    /// Convert ISO 8601 to iCalendar form.
    ///
    /// `2025-03-01T10:00:00Z` becomes `20250301T100000Z`; naive times stay
    /// floating. Unparseable input is returned unchanged.
    pub fn format_ical_datetime(iso: &str) -> String {
        if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(iso) {
            return dt
                .with_timezone(&chrono::Utc)
                .format("%Y%m%dT%H%M%SZ")
                .to_string();
        }
        for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(iso, fmt) {
                return dt.format("%Y%m%dT%H%M%S").to_string();
            }
        }
        if let Ok(d) = chrono::NaiveDate::parse_from_str(iso, "%Y-%m-%d") {
            return d.format("%Y%m%d").to_string();
        }
        iso.to_string()
    }

    /// Extract VEVENT blocks from raw iCalendar data.
    ///
    /// Property parameters are dropped (`DTSTART;TZID=...:x` becomes
    /// `dtstart`), repeated `ATTENDEE` lines are collected into an array.
    pub fn parse_ical_events(ical_data: &str) -> Vec<Value> {
        let mut events = Vec::new();
        let mut current: Option<Map<String, Value>> = None;

        for line in unfold_lines(ical_data) {
            let trimmed = line.trim();
            if trimmed == "BEGIN:VEVENT" {
                current = Some(Map::new());
            } else if trimmed == "END:VEVENT" {
                if let Some(event) = current.take() {
                    events.push(Value::Object(event));
                }
            } else if let Some(event) = current.as_mut()
                && let Some((key, value)) = trimmed.split_once(':')
            {
                let clean_key = key.split(';').next().unwrap_or(key).to_lowercase();
                if clean_key == "attendee" {
                    let address = value.strip_prefix("mailto:").unwrap_or(value);
                    let entry = event
                        .entry("attendee")
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(list) = entry {
                        list.push(Value::String(address.to_owned()));
                    }
                } else {
                    event.insert(clean_key, Value::String(unescape_text(value)));
                }
            }
        }

        events
    }

    fn build_request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            builder = builder.basic_auth(user, Some(pass));
        }
        builder
    }

    async fn put_event(&self, action: &str, uid: &str, event: &EventFields) -> Result<Value> {
        let event_url = self.event_url(action, uid)?;
        let body = Self::generate_ical_event(uid, event);

        debug!(url = %event_url, summary = %event.summary, action, "writing calendar event");

        let response = self
            .build_request(reqwest::Method::PUT, &event_url)
            .header("Content-Type", "text/calendar; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                action: action.into(),
                reason: format!("failed to write event: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::HttpStatus {
                action: action.into(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(json!({
            "uid": uid,
            "url": event_url,
            "status": status.as_u16(),
        }))
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    async fn create_event(&self, params: Value) -> Result<Value> {
        let required = |key: &str| {
            params
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .ok_or_else(|| AdapterError::InvalidParams {
                    action: CREATE_EVENT.into(),
                    reason: format!("missing required string field `{key}`"),
                })
        };

        let mut event = EventFields {
            summary: required("summary")?,
            start: required("start")?,
            end: required("end")?,
            ..EventFields::default()
        };
        event.apply_patch(&params);

        let uid = Uuid::now_v7().to_string();
        self.put_event(CREATE_EVENT, &uid, &event).await
    }

    async fn update_event(&self, params: Value) -> Result<Value> {
        let uid = params
            .get("uid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AdapterError::InvalidParams {
                action: UPDATE_EVENT.into(),
                reason: "missing required string field `uid`".into(),
            })?
            .to_owned();

        let event_url = self.event_url(UPDATE_EVENT, &uid)?;
        debug!(url = %event_url, uid = %uid, "fetching event for update");

        let response = self
            .build_request(reqwest::Method::GET, &event_url)
            .send()
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                action: UPDATE_EVENT.into(),
                reason: format!("failed to fetch event: {e}"),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AdapterError::ExecutionFailed {
                action: UPDATE_EVENT.into(),
                reason: format!("event `{uid}` not found"),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                action: UPDATE_EVENT.into(),
                reason: format!("failed to read event: {e}"),
            })?;
        if !status.is_success() {
            return Err(AdapterError::HttpStatus {
                action: UPDATE_EVENT.into(),
                status: status.as_u16(),
                body,
            });
        }

        let existing = Self::parse_ical_events(&body)
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::ExecutionFailed {
                action: UPDATE_EVENT.into(),
                reason: format!("event `{uid}` has no VEVENT"),
            })?;

        let mut event = EventFields::from_parsed(&existing);
        event.apply_patch(&params);
        self.put_event(UPDATE_EVENT, &uid, &event).await
    }
}

/// Join RFC 5545 folded lines (continuations start with a space or tab).
fn unfold_lines(data: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in data.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(rest) = raw.strip_prefix([' ', '\t'])
            && let Some(last) = lines.last_mut()
        {
            last.push_str(rest);
        } else {
            lines.push(raw.to_owned());
        }
    }
    lines
}

fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

fn unescape_text(text: &str) -> String {
    text.replace("\\n", "\n")
        .replace("\\N", "\n")
        .replace("\\,", ",")
        .replace("\\;", ";")
        .replace("\\\\", "\\")
}

// ---------------------------------------------------------------------------
// Provider trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ActionProvider for CalendarProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Productivity
    }

    async fn connect(&mut self) -> Result<()> {
        if let Some(url) = &self.caldav_url {
            url::Url::parse(url)
                .map_err(|e| AdapterError::ConfigError(format!("invalid CalDAV URL `{url}`: {e}")))?;
            info!(id = %self.id, url = %url, "calendar provider connected");
        } else {
            info!(id = %self.id, "calendar provider connected without CalDAV URL");
        }
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!(id = %self.id, "calendar provider disconnected");
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if !self.connected {
            return Ok(HealthStatus::Unhealthy);
        }
        if self.caldav_url.is_some() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded)
        }
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        vec![
            ActionDescriptor::new(
                CREATE_EVENT,
                "Create a new calendar event (meeting, appointment) on a CalDAV server",
                json!({
                    "type": "object",
                    "properties": {
                        "summary": { "type": "string", "description": "Event title" },
                        "start": { "type": "string", "description": "Start time, ISO 8601" },
                        "end": { "type": "string", "description": "End time, ISO 8601" },
                        "description": { "type": "string", "description": "Event notes" },
                        "location": { "type": "string", "description": "Where the event happens" },
                        "attendees": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Attendee email addresses"
                        }
                    },
                    "required": ["summary", "start", "end"]
                }),
            ),
            ActionDescriptor::new(
                UPDATE_EVENT,
                "Update an existing calendar event identified by its UID",
                json!({
                    "type": "object",
                    "properties": {
                        "uid": { "type": "string", "description": "UID of the event to change" },
                        "summary": { "type": "string", "description": "New title" },
                        "start": { "type": "string", "description": "New start time, ISO 8601" },
                        "end": { "type": "string", "description": "New end time, ISO 8601" },
                        "description": { "type": "string", "description": "New notes" },
                        "location": { "type": "string", "description": "New location" },
                        "attendees": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Replacement attendee list"
                        }
                    },
                    "required": ["uid"]
                }),
            ),
        ]
    }

    async fn invoke(&self, name: &str, payload: Value) -> Result<Value> {
        if !self.connected {
            return Err(AdapterError::ExecutionFailed {
                action: name.to_string(),
                reason: format!("provider `{}` is not connected", self.id),
            });
        }

        match name {
            CREATE_EVENT => self.create_event(payload).await,
            UPDATE_EVENT => self.update_event(payload).await,
            _ => Err(AdapterError::ActionNotFound {
                provider_id: self.id.clone(),
                action: name.to_string(),
            }),
        }
    }

    fn required_auth(&self) -> Option<AuthRequirement> {
        Some(AuthRequirement {
            provider: "caldav".into(),
            scopes: vec!["calendar:write".into()],
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
