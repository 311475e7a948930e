//! Issue-tracker provider backed by the GitHub REST API.
//!
//! Creates and updates issues. A default repository can be configured so
//! payloads only need issue fields; `owner` and `repo` in a payload still
//! override it. GitHub Enterprise works through [`IssueTrackerProvider::with_base_url`].

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::error::{AdapterError, Result};
use crate::traits::{ActionDescriptor, ActionProvider, AuthRequirement, HealthStatus, ProviderKind};

/// Default GitHub API base URL.
const DEFAULT_BASE_URL: &str = "https://api.github.com";

const CREATE_ISSUE: &str = "issues_create_issue";
const UPDATE_ISSUE: &str = "issues_update_issue";

/// GitHub issue-tracker provider.
pub struct IssueTrackerProvider {
    id: String,
    connected: bool,
    token: Option<String>,
    /// Default `(owner, repo)` used when a payload does not name one.
    repository: Option<(String, String)>,
    base_url: String,
    client: reqwest::Client,
}

impl IssueTrackerProvider {
    /// Create a provider with the default API URL and no token.
    pub fn new(id: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("lookout/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            id: id.to_string(),
            connected: false,
            token: None,
            repository: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    /// Create a provider with a token.
    pub fn with_token(id: &str, token: &str) -> Self {
        let mut provider = Self::new(id);
        provider.token = Some(token.to_string());
        provider
    }

    /// Point the provider at a GitHub Enterprise instance.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the default repository from an `owner/repo` slug.
    pub fn with_repository(mut self, slug: &str) -> Result<Self> {
        let (owner, repo) = slug
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| {
                AdapterError::ConfigError(format!("repository must be `owner/repo`, got `{slug}`"))
            })?;
        self.repository = Some((owner.to_string(), repo.to_string()));
        Ok(self)
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| AdapterError::AuthRequired {
                provider_id: self.id.clone(),
                provider: "github".to_string(),
            })
    }

    /// Resolve the target repository for a payload.
    fn resolve_repository(&self, action: &str, params: &Value) -> Result<(String, String)> {
        let field = |key: &str| {
            params
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        match (field("owner"), field("repo"), &self.repository) {
            (Some(owner), Some(repo), _) => Ok((owner, repo)),
            (None, Some(repo), Some((owner, _))) => Ok((owner.clone(), repo)),
            (None, None, Some(default)) => Ok(default.clone()),
            _ => Err(AdapterError::InvalidParams {
                action: action.into(),
                reason: "no repository: pass `owner` and `repo` or configure a default".into(),
            }),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {token}"))
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// Send a request and parse the JSON response, watching the rate limit.
    async fn send_request(&self, request: reqwest::RequestBuilder, action: &str) -> Result<Value> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    seconds: 30,
                    reason: format!("GitHub API request timed out: {e}"),
                }
            } else {
                AdapterError::ExecutionFailed {
                    action: action.to_string(),
                    reason: format!("GitHub API request failed: {e}"),
                }
            }
        })?;

        let status = response.status();

        let rate_remaining = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(remaining) = rate_remaining
            && remaining < 10
        {
            warn!(remaining, action, "GitHub API rate limit is low");
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| AdapterError::ExecutionFailed {
                action: action.to_string(),
                reason: format!("failed to read response body: {e}"),
            })?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body_text)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_owned))
                .unwrap_or(body_text);
            return Err(AdapterError::HttpStatus {
                action: action.to_string(),
                status: status.as_u16(),
                body: message,
            });
        }

        serde_json::from_str(&body_text).map_err(|e| AdapterError::ExecutionFailed {
            action: action.to_string(),
            reason: format!("failed to parse GitHub API response as JSON: {e}"),
        })
    }

    // -----------------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------------

    async fn create_issue(&self, params: Value) -> Result<Value> {
        let title = params
            .get("title")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AdapterError::InvalidParams {
                action: CREATE_ISSUE.into(),
                reason: "missing required string field `title`".into(),
            })?;
        let (owner, repo) = self.resolve_repository(CREATE_ISSUE, &params)?;
        let token = self.token()?;

        let mut body = issue_body(&params);
        body.insert("title".into(), json!(title));

        let url = self.api_url(&format!("/repos/{owner}/{repo}/issues"));
        debug!(url = %url, "creating issue");
        let created = self
            .send_request(
                self.request(reqwest::Method::POST, &url, token).json(&body),
                CREATE_ISSUE,
            )
            .await?;
        Ok(issue_summary(&created))
    }

    async fn update_issue(&self, params: Value) -> Result<Value> {
        let number = issue_number(&params).ok_or_else(|| AdapterError::InvalidParams {
            action: UPDATE_ISSUE.into(),
            reason: "missing required integer field `number`".into(),
        })?;
        let (owner, repo) = self.resolve_repository(UPDATE_ISSUE, &params)?;
        let token = self.token()?;

        let mut body = issue_body(&params);
        if let Some(title) = params.get("title").and_then(Value::as_str) {
            body.insert("title".into(), json!(title));
        }
        if let Some(state) = params.get("state").and_then(Value::as_str) {
            if state != "open" && state != "closed" {
                return Err(AdapterError::InvalidParams {
                    action: UPDATE_ISSUE.into(),
                    reason: format!("`state` must be `open` or `closed`, got `{state}`"),
                });
            }
            body.insert("state".into(), json!(state));
        }
        if body.is_empty() {
            return Err(AdapterError::InvalidParams {
                action: UPDATE_ISSUE.into(),
                reason: "nothing to update".into(),
            });
        }

        let url = self.api_url(&format!("/repos/{owner}/{repo}/issues/{number}"));
        debug!(url = %url, "updating issue");
        let updated = self
            .send_request(
                self.request(reqwest::Method::PATCH, &url, token).json(&body),
                UPDATE_ISSUE,
            )
            .await?;
        Ok(issue_summary(&updated))
    }
}

/// Accepts `42`, `"42"` and `"#42"`.
fn issue_number(params: &Value) -> Option<u64> {
    match params.get("number")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().trim_start_matches('#').parse().ok(),
        _ => None,
    }
}

/// Optional fields shared by create and update.
fn issue_body(params: &Value) -> Map<String, Value> {
    let mut body = Map::new();
    if let Some(text) = params.get("body").and_then(Value::as_str) {
        body.insert("body".into(), json!(text));
    }
    for key in ["labels", "assignees"] {
        if let Some(list) = params.get(key).and_then(Value::as_array) {
            body.insert(key.into(), Value::Array(list.clone()));
        }
    }
    body
}

/// Keep only the fields callers care about.
fn issue_summary(issue: &Value) -> Value {
    json!({
        "number": issue.get("number"),
        "url": issue.get("html_url"),
        "state": issue.get("state"),
        "title": issue.get("title"),
    })
}

// ---------------------------------------------------------------------------
// Provider trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl ActionProvider for IssueTrackerProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::DevTools
    }

    async fn connect(&mut self) -> Result<()> {
        if let Some(token) = &self.token {
            let url = self.api_url("/user");
            let user = self
                .send_request(self.request(reqwest::Method::GET, &url, token), "connect")
                .await
                .map_err(|e| match e {
                    AdapterError::HttpStatus { status: 401, .. } => AdapterError::AuthRequired {
                        provider_id: self.id.clone(),
                        provider: "github".into(),
                    },
                    other => other,
                })?;
            let login = user
                .get("login")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            info!(
                id = %self.id,
                user = %login,
                "issue tracker connected and authenticated"
            );
        } else {
            info!(id = %self.id, "issue tracker connected (no token configured)");
        }

        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        info!(id = %self.id, "issue tracker disconnected");
        self.connected = false;
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthStatus> {
        if !self.connected {
            return Ok(HealthStatus::Unhealthy);
        }
        match (&self.token, &self.repository) {
            (Some(_), Some(_)) => Ok(HealthStatus::Healthy),
            _ => Ok(HealthStatus::Degraded),
        }
    }

    fn actions(&self) -> Vec<ActionDescriptor> {
        let mut create_required = vec!["title"];
        let mut update_required = vec!["number"];
        if self.repository.is_none() {
            create_required.extend(["owner", "repo"]);
            update_required.extend(["owner", "repo"]);
        }

        vec![
            ActionDescriptor::new(
                CREATE_ISSUE,
                "Create a new issue (bug, ticket, task) in the issue tracker",
                json!({
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "description": "Issue title" },
                        "body": { "type": "string", "description": "Issue description (Markdown)" },
                        "labels": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Labels to apply"
                        },
                        "assignees": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Usernames to assign"
                        },
                        "owner": { "type": "string", "description": "Repository owner" },
                        "repo": { "type": "string", "description": "Repository name" }
                    },
                    "required": create_required
                }),
            ),
            ActionDescriptor::new(
                UPDATE_ISSUE,
                "Update an existing issue identified by its number",
                json!({
                    "type": "object",
                    "properties": {
                        "number": { "type": "integer", "description": "Issue number" },
                        "title": { "type": "string", "description": "New title" },
                        "body": { "type": "string", "description": "New description" },
                        "state": {
                            "type": "string",
                            "enum": ["open", "closed"],
                            "description": "New state"
                        },
                        "labels": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Replacement labels"
                        },
                        "assignees": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Replacement assignees"
                        },
                        "owner": { "type": "string", "description": "Repository owner" },
                        "repo": { "type": "string", "description": "Repository name" }
                    },
                    "required": update_required
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
            CREATE_ISSUE => self.create_issue(payload).await,
            UPDATE_ISSUE => self.update_issue(payload).await,
            _ => Err(AdapterError::ActionNotFound {
                provider_id: self.id.clone(),
                action: name.to_string(),
            }),
        }
    }

    fn required_auth(&self) -> Option<AuthRequirement> {
        Some(AuthRequirement {
            provider: "github".into(),
            scopes: vec!["repo".into()],
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
