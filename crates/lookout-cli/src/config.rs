//! Configuration loaded from `config/default.toml`.
//!
//! Every section and key is optional; missing values fall back to the
//! defaults below. Secrets never live here, they come from the environment
//! (see [`crate::helpers`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use lookout_intent::{DispatchConfig, ExtractorConfig, LookoutCache, PipelineConfig};
use serde::Deserialize;
use tracing::debug;

/// Default location of the configuration file, relative to the working
/// directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineSection,
    pub cache: CacheConfig,
    pub sources: SourcesConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            request_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub fetch_timeout_secs: u64,
    pub generation_timeout_secs: u64,
    pub action_timeout_secs: u64,
    pub dispatch_concurrency: usize,
    pub default_duration_minutes: i64,
    /// How many documents `lookout process` runs at once.
    pub document_concurrency: usize,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 30,
            generation_timeout_secs: 120,
            action_timeout_secs: 30,
            dispatch_concurrency: 4,
            default_duration_minutes: 30,
            document_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: 64,
            ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Directory that relative document references resolve against.
    pub root: PathBuf,
    pub max_bytes: u64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_bytes: lookout_adapters::source::DEFAULT_MAX_BYTES,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/lookout.db"),
        }
    }
}

impl AppConfig {
    /// Load `path`, or the defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let p = &self.pipeline;
        PipelineConfig {
            fetch_timeout: Duration::from_secs(p.fetch_timeout_secs),
            generation_timeout: Duration::from_secs(p.generation_timeout_secs),
            dispatch: DispatchConfig {
                concurrency: p.dispatch_concurrency.max(1),
                action_timeout: Duration::from_secs(p.action_timeout_secs),
            },
            extractor: ExtractorConfig {
                default_duration_minutes: p.default_duration_minutes,
            },
        }
    }

    pub fn lookout_cache(&self) -> LookoutCache {
        LookoutCache::builder()
            .max_capacity(self.cache.max_capacity)
            .ttl_seconds(self.cache.ttl_secs)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.pipeline.dispatch_concurrency, 4);
        assert_eq!(config.store.path, PathBuf::from("data/lookout.db"));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = AppConfig::parse(
            r#"
            [pipeline]
            action_timeout_secs = 5
            default_duration_minutes = 45

            [cache]
            ttl_secs = 60
            "#,
        )
        .unwrap();
        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.dispatch.action_timeout, Duration::from_secs(5));
        assert_eq!(pipeline.extractor.default_duration_minutes, 45);
        assert_eq!(pipeline.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.max_capacity, 64);
    }

    #[test]
    fn zero_concurrency_is_clamped() {
        let config = AppConfig::parse("[pipeline]\ndispatch_concurrency = 0").unwrap();
        assert_eq!(config.pipeline_config().dispatch.concurrency, 1);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(AppConfig::parse("[pipeline\nfoo = ").is_err());
        assert!(AppConfig::parse("[pipeline]\nfetch_timeout_secs = \"soon\"").is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.cache.ttl_secs, 3600);
    }
}
