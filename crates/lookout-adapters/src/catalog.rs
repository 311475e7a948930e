//! The action catalog.
//!
//! A read-only registry of every action the connected providers expose.
//! The pipeline lists actions from it, derives lookouts from it, and routes
//! invocations through it. A catalog is immutable once built; its
//! [`fingerprint`](ActionCatalog::fingerprint) identifies its contents.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use ring::digest;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{AdapterError, Result};
use crate::traits::{ActionDescriptor, ActionProvider, HealthStatus};

/// Registry of actions backed by one or more providers.
#[derive(Clone)]
pub struct ActionCatalog {
    providers: Vec<Arc<dyn ActionProvider>>,
    descriptors: Vec<ActionDescriptor>,
    /// Action name -> index into `providers`.
    routes: HashMap<String, usize>,
    fingerprint: String,
}

impl std::fmt::Debug for ActionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionCatalog")
            .field("actions", &self.descriptors.len())
            .field("providers", &self.providers.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl ActionCatalog {
    /// Build a catalog from connected providers.
    ///
    /// Fails if two providers declare the same action name.
    pub fn new(providers: Vec<Arc<dyn ActionProvider>>) -> Result<Self> {
        let mut descriptors = Vec::new();
        let mut routes: HashMap<String, usize> = HashMap::new();

        for (index, provider) in providers.iter().enumerate() {
            for descriptor in provider.actions() {
                if let Some(&existing) = routes.get(&descriptor.name) {
                    return Err(AdapterError::DuplicateAction {
                        action: descriptor.name,
                        first: providers[existing].id().to_owned(),
                        second: provider.id().to_owned(),
                    });
                }
                routes.insert(descriptor.name.clone(), index);
                descriptors.push(descriptor);
            }
        }

        let fingerprint = fingerprint_of(&descriptors);
        info!(
            providers = providers.len(),
            actions = descriptors.len(),
            fingerprint = %fingerprint,
            "action catalog built"
        );

        Ok(Self {
            providers,
            descriptors,
            routes,
            fingerprint,
        })
    }

    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            descriptors: Vec::new(),
            routes: HashMap::new(),
            fingerprint: fingerprint_of(&[]),
        }
    }

    /// All actions, in provider then declaration order.
    pub fn list_actions(&self) -> &[ActionDescriptor] {
        &self.descriptors
    }

    /// Look up a single action by name.
    pub fn descriptor(&self, name: &str) -> Option<&ActionDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Whether the catalog has no actions.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Hex SHA-256 over the catalog contents, independent of provider order.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Invoke an action on the provider that owns it.
    pub async fn invoke(&self, name: &str, payload: Value) -> Result<Value> {
        let index = *self
            .routes
            .get(name)
            .ok_or_else(|| AdapterError::ActionNotFound {
                provider_id: "catalog".into(),
                action: name.to_owned(),
            })?;
        let provider = &self.providers[index];
        debug!(action = %name, provider = %provider.id(), "invoking action");
        provider.invoke(name, payload).await
    }

    /// Health of every provider, in registration order.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let mut statuses = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let status = provider
                .health_check()
                .await
                .unwrap_or(HealthStatus::Unhealthy);
            statuses.push((provider.id().to_owned(), status));
        }
        statuses
    }

    /// The registered providers.
    pub fn providers(&self) -> &[Arc<dyn ActionProvider>] {
        &self.providers
    }
}

// ---------------------------------------------------------------------------
// Fingerprinting
// ---------------------------------------------------------------------------

fn fingerprint_of(descriptors: &[ActionDescriptor]) -> String {
    let mut sorted: Vec<&ActionDescriptor> = descriptors.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut ctx = digest::Context::new(&digest::SHA256);
    for d in sorted {
        let mut schema = String::new();
        write_canonical(&d.input_schema, &mut schema);
        ctx.update(d.name.as_bytes());
        ctx.update(&[0]);
        ctx.update(d.description.as_bytes());
        ctx.update(&[0]);
        ctx.update(schema.as_bytes());
        ctx.update(b"\n");
    }

    let mut hex = String::with_capacity(64);
    for byte in ctx.finish().as_ref() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

/// Serialize JSON with object keys sorted, so key order never changes a hash.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
