//! Action providers and document sources.
//!
//! Providers are enabled by the environment: CalDAV settings turn on the
//! calendar, a GitHub token or repository turns on the issue tracker. A
//! provider that fails to connect is logged and left out of the catalog.

use std::sync::Arc;

use anyhow::{Context, Result};
use lookout_adapters::{
    ActionCatalog, ActionProvider, CalendarProvider, DocumentSource, FileSource, HttpSource,
    IssueTrackerProvider,
};
use tracing::{info, warn};

use crate::config::SourcesConfig;

/// Connection settings for the reference providers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderSettings {
    pub caldav_url: Option<String>,
    pub caldav_username: Option<String>,
    pub caldav_password: Option<String>,
    pub github_token: Option<String>,
    pub github_repository: Option<String>,
}

impl ProviderSettings {
    /// Read `CALDAV_*` and `GITHUB_*` from the environment.
    pub fn from_env() -> Self {
        use crate::helpers::env_non_empty;
        Self {
            caldav_url: env_non_empty("CALDAV_URL"),
            caldav_username: env_non_empty("CALDAV_USERNAME"),
            caldav_password: env_non_empty("CALDAV_PASSWORD"),
            github_token: env_non_empty("GITHUB_TOKEN"),
            github_repository: env_non_empty("GITHUB_REPOSITORY"),
        }
    }
}

/// Connect every configured provider and build the catalog.
pub async fn init_catalog(settings: &ProviderSettings) -> Result<ActionCatalog> {
    let mut providers: Vec<Arc<dyn ActionProvider>> = Vec::new();

    if let Some(url) = &settings.caldav_url {
        let mut calendar = CalendarProvider::with_caldav(
            "calendar",
            url.as_str(),
            settings.caldav_username.clone().unwrap_or_default(),
            settings.caldav_password.clone().unwrap_or_default(),
        );
        match calendar.connect().await {
            Ok(()) => providers.push(Arc::new(calendar)),
            Err(e) => warn!(error = %e, "calendar provider failed to connect"),
        }
    }

    if settings.github_token.is_some() || settings.github_repository.is_some() {
        let mut issues = match &settings.github_token {
            Some(token) => IssueTrackerProvider::with_token("issues", token),
            None => IssueTrackerProvider::new("issues"),
        };
        if let Some(slug) = &settings.github_repository {
            issues = issues
                .with_repository(slug)
                .context("GITHUB_REPOSITORY is invalid")?;
        }
        match issues.connect().await {
            Ok(()) => providers.push(Arc::new(issues)),
            Err(e) => warn!(error = %e, "issue tracker provider failed to connect"),
        }
    }

    if providers.is_empty() {
        warn!("no action providers configured; documents will produce empty reports");
    }

    let catalog = ActionCatalog::new(providers).context("failed to build the action catalog")?;
    info!(actions = catalog.list_actions().len(), "action catalog ready");
    Ok(catalog)
}

/// Routes document references to the file or HTTP source.
pub struct Sources {
    files: FileSource,
    http: HttpSource,
}

impl Sources {
    pub fn new(config: &SourcesConfig) -> Self {
        Self {
            files: FileSource::new(config.root.clone()).with_max_bytes(config.max_bytes),
            http: HttpSource::new().with_max_bytes(config.max_bytes),
        }
    }

    /// The source that serves `reference`.
    pub fn for_reference(&self, reference: &str) -> &dyn DocumentSource {
        if is_url(reference) {
            &self.http
        } else {
            &self.files
        }
    }
}

fn is_url(reference: &str) -> bool {
    let lower = reference.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_settings_yields_empty_catalog() {
        let catalog = init_catalog(&ProviderSettings::default()).await.unwrap();
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn configured_providers_are_registered() {
        let settings = ProviderSettings {
            caldav_url: Some("http://127.0.0.1:9/cal".into()),
            caldav_username: Some("u".into()),
            caldav_password: Some("p".into()),
            github_token: None,
            github_repository: Some("acme/widgets".into()),
        };
        let catalog = init_catalog(&settings).await.unwrap();
        let ids: Vec<&str> = catalog.providers().iter().map(|p| p.id()).collect();
        assert_eq!(ids, vec!["calendar", "issues"]);
    }

    #[tokio::test]
    async fn invalid_repository_slug_is_an_error() {
        let settings = ProviderSettings {
            github_repository: Some("not-a-slug".into()),
            ..Default::default()
        };
        assert!(init_catalog(&settings).await.is_err());
    }

    #[test]
    fn urls_route_to_http() {
        assert!(is_url("https://example.com/minutes.pdf"));
        assert!(is_url("HTTP://example.com"));
        assert!(!is_url("inbox/minutes.pdf"));
        assert!(!is_url("ftp://example.com/a.txt"));
    }
}
