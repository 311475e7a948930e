//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, LLM provider resolution and environment
//! variable utilities.

use std::time::Duration;

use anyhow::{Result, bail};
use lookout_agent::LlmClientConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LlmConfig;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Initialize the tracing subscriber with the given default log level.
///
/// `RUST_LOG` takes precedence. Logs go to stderr so that reports printed on
/// stdout stay machine-readable.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// LLM provider resolution
// ---------------------------------------------------------------------------

const DEFAULT_MODEL_ANTHROPIC: &str = "claude-sonnet-4-20250514";
const DEFAULT_MODEL_OPENAI: &str = "gpt-4o";

/// Resolve which LLM provider, API key and model to use.
///
/// Resolution order:
///
/// 1. If `LOOKOUT_PROVIDER` is set, use that provider explicitly. Any name
///    other than `anthropic` / `openai` is treated as an OpenAI-compatible
///    endpoint and requires `LOOKOUT_API_BASE_URL`.
/// 2. Otherwise, auto-detect: `ANTHROPIC_API_KEY` -> `OPENAI_API_KEY`.
///
/// The model can always be overridden with `LOOKOUT_MODEL` and the base URL
/// with `LOOKOUT_API_BASE_URL`.
pub fn resolve_llm_config(llm: &LlmConfig) -> Result<LlmClientConfig> {
    resolve_llm_config_with(env_non_empty, llm)
}

/// [`resolve_llm_config`] over an arbitrary variable lookup.
pub fn resolve_llm_config_with(
    lookup: impl Fn(&str) -> Option<String>,
    llm: &LlmConfig,
) -> Result<LlmClientConfig> {
    let explicit_provider = lookup("LOOKOUT_PROVIDER");
    let model_override = lookup("LOOKOUT_MODEL");
    let base_url_override = lookup("LOOKOUT_API_BASE_URL");

    let try_anthropic = || -> Option<LlmClientConfig> {
        let key = lookup("ANTHROPIC_API_KEY")?;
        let model = model_override
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL_ANTHROPIC.to_owned());
        let mut cfg = LlmClientConfig::anthropic(key, model);
        if let Some(ref url) = base_url_override {
            cfg.base_url = url.clone();
        }
        Some(cfg)
    };

    let try_openai = || -> Option<LlmClientConfig> {
        let key = lookup("OPENAI_API_KEY")?;
        let model = model_override
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL_OPENAI.to_owned());
        let mut cfg = LlmClientConfig::openai(key, model);
        if let Some(ref url) = base_url_override {
            cfg.base_url = url.clone();
        }
        Some(cfg)
    };

    let mut cfg = if let Some(ref provider) = explicit_provider {
        let p = provider.to_lowercase();
        match p.as_str() {
            "anthropic" | "claude" => match try_anthropic() {
                Some(cfg) => cfg,
                None => bail!("LOOKOUT_PROVIDER is `{p}` but ANTHROPIC_API_KEY is not set"),
            },
            "openai" | "gpt" => match try_openai() {
                Some(cfg) => cfg,
                None => bail!("LOOKOUT_PROVIDER is `{p}` but OPENAI_API_KEY is not set"),
            },
            _ => {
                let Some(base) = base_url_override.clone() else {
                    bail!("LOOKOUT_API_BASE_URL is required for provider `{p}`");
                };
                let key = lookup("OPENAI_API_KEY").unwrap_or_else(|| "no-key".to_owned());
                let model = model_override.clone().unwrap_or_else(|| p.clone());
                LlmClientConfig::openai_compatible(key, model, base)
            }
        }
    } else if let Some(cfg) = try_anthropic() {
        cfg
    } else if let Some(cfg) = try_openai() {
        cfg
    } else {
        bail!(
            "no LLM credentials found: set ANTHROPIC_API_KEY or OPENAI_API_KEY \
             (or LOOKOUT_PROVIDER with LOOKOUT_API_BASE_URL)"
        );
    };

    cfg.max_tokens = llm.max_tokens;
    cfg.request_timeout = Duration::from_secs(llm.request_timeout_secs);
    info!(
        provider = cfg.provider.as_str(),
        model = %cfg.default_model,
        "LLM provider resolved"
    );
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Read an environment variable, treating empty values as unset.
pub fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
