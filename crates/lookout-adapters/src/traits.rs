//! Core provider trait and supporting types.
//!
//! Every external integration (calendar, issue tracker, ...) implements
//! [`ActionProvider`], which gives the catalog a uniform way to discover and
//! invoke actions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// The category of service a provider fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Calendars, documents, reminders.
    Productivity,
    /// Issue trackers, code hosting.
    DevTools,
    /// Messaging services.
    Messaging,
    /// Anything else, including in-process test providers.
    Custom,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Productivity => write!(f, "productivity"),
            Self::DevTools => write!(f, "devtools"),
            Self::Messaging => write!(f, "messaging"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

/// The health status of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Working with reduced capability (e.g. missing optional config).
    Degraded,
    /// Not functional.
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// An external action available to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// Machine-readable action name (e.g. `calendar_create_event`).
    pub name: String,
    /// Human-readable description of what the action does.
    pub description: String,
    /// JSON Schema describing the action's payload.
    pub input_schema: Value,
}

impl ActionDescriptor {
    /// Create a new descriptor.
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Property names declared by the input schema, in declaration order.
    pub fn properties(&self) -> Vec<&str> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Property names listed as required by the input schema.
    pub fn required(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|req| req.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// The declared JSON type of a property, if any.
    pub fn property_type(&self, property: &str) -> Option<&str> {
        self.input_schema
            .get("properties")?
            .get(property)?
            .get("type")?
            .as_str()
    }
}

/// Credentials a provider needs before it can act.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequirement {
    /// The credential provider name (e.g. `github`, `caldav`).
    pub provider: String,
    /// The scopes or permissions required.
    pub scopes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Core trait
// ---------------------------------------------------------------------------

/// The universal provider interface.
///
/// The catalog discovers actions via [`ActionProvider::actions`] and invokes
/// them via [`ActionProvider::invoke`].
#[async_trait]
pub trait ActionProvider: Send + Sync {
    /// Return the unique identifier for this provider instance.
    fn id(&self) -> &str;

    /// Return the category of service this provider fronts.
    fn kind(&self) -> ProviderKind;

    /// Establish a connection to the backing service.
    async fn connect(&mut self) -> Result<()>;

    /// Gracefully disconnect from the backing service.
    async fn disconnect(&mut self) -> Result<()>;

    /// Check whether the provider is healthy and operational.
    async fn health_check(&self) -> Result<HealthStatus>;

    /// Return the actions this provider exposes.
    fn actions(&self) -> Vec<ActionDescriptor>;

    /// Invoke a named action with a JSON payload.
    async fn invoke(&self, name: &str, payload: Value) -> Result<Value>;

    /// Return the authentication requirements for this provider, if any.
    fn required_auth(&self) -> Option<AuthRequirement> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn descriptor() -> ActionDescriptor {
        ActionDescriptor::new(
            "issues_create_issue",
            "Create an issue",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "labels": {"type": "array", "items": {"type": "string"}}
                },
                "required": ["title"]
            }),
        )
    }

    #[test]
    fn descriptor_schema_accessors() {
        let d = descriptor();
        assert_eq!(d.properties(), vec!["title", "labels"]);
        assert_eq!(d.required(), vec!["title"]);
        assert_eq!(d.property_type("labels"), Some("array"));
        assert_eq!(d.property_type("missing"), None);
    }

    #[test]
    fn descriptor_serializes_camel_case() {
        let v = serde_json::to_value(descriptor()).unwrap();
        assert!(v.get("inputSchema").is_some());
        assert!(v.get("input_schema").is_none());
    }

    #[test]
    fn descriptor_without_schema_properties() {
        let d = ActionDescriptor::new("noop", "does nothing", json!({}));
        assert!(d.properties().is_empty());
        assert!(d.required().is_empty());
    }

    #[test]
    fn display_impls() {
        assert_eq!(ProviderKind::DevTools.to_string(), "devtools");
        assert_eq!(HealthStatus::Degraded.to_string(), "degraded");
    }
}
