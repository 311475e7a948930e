//! CLI entry point for Lookout.
//!
//! This binary provides the `lookout` command with subcommands for
//! processing documents and inspecting the catalog and past runs.

mod adapters;
mod cli;
mod config;
mod helpers;
mod sink;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use futures::stream::{self, StreamExt};
use lookout_agent::{LlmClient, StructuredGenerator};
use lookout_intent::{Pipeline, RunStatus};
use lookout_store::{Database, RunStore};
use tracing::{info, warn};

use crate::adapters::{ProviderSettings, Sources, init_catalog};
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::helpers::{init_tracing, resolve_llm_config};
use crate::sink::StoreSink;

#[tokio::main]
async fn main() -> Result<()> {
    // Secrets may come from a local `.env`; a missing file is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    init_tracing(&config.logging.level);
    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "configuration file not found, using defaults");
    }

    match cli.command {
        Commands::Process {
            references,
            concurrency,
            text,
        } => cmd_process(&config, references, concurrency, text).await,
        Commands::Lookouts => cmd_lookouts(&config).await,
        Commands::Actions => cmd_actions().await,
        Commands::Runs { limit } => cmd_runs(&config, limit).await,
    }
}

// ---------------------------------------------------------------------------
// Shared setup
// ---------------------------------------------------------------------------

async fn build_pipeline(config: &AppConfig) -> Result<Pipeline> {
    let catalog = init_catalog(&ProviderSettings::from_env()).await?;
    let client =
        LlmClient::new(resolve_llm_config(&config.llm)?).context("failed to create LLM client")?;
    let generator: Arc<dyn StructuredGenerator> = Arc::new(client);

    Ok(
        Pipeline::new(generator, Arc::new(catalog), config.pipeline_config())
            .with_cache(config.lookout_cache()),
    )
}

async fn open_run_store(config: &AppConfig) -> Result<RunStore> {
    let db = Database::open_and_migrate(config.store.path.clone())
        .await
        .with_context(|| format!("failed to open run store {}", config.store.path.display()))?;
    Ok(RunStore::new(db))
}

// ---------------------------------------------------------------------------
// Subcommand: process
// ---------------------------------------------------------------------------

async fn cmd_process(
    config: &AppConfig,
    references: Vec<String>,
    concurrency: Option<usize>,
    text: bool,
) -> Result<()> {
    let runs = open_run_store(config).await?;
    let pipeline = build_pipeline(config)
        .await?
        .with_sink(Arc::new(StoreSink::new(runs)));
    let sources = Sources::new(&config.sources);

    let concurrency = concurrency
        .unwrap_or(config.pipeline.document_concurrency)
        .max(1);
    info!(documents = references.len(), concurrency, "processing documents");

    let reports: Vec<_> = stream::iter(references.iter())
        .map(|reference| pipeline.process(sources.for_reference(reference), reference))
        .buffered(concurrency)
        .collect()
        .await;

    let mut incomplete = 0;
    for report in &reports {
        if report.status != RunStatus::Success {
            incomplete += 1;
        }
        if text {
            print!("{}", report.render_text());
        } else {
            println!("{}", report.to_json());
        }
    }

    if incomplete > 0 {
        bail!("{incomplete} of {} documents did not complete", reports.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: lookouts
// ---------------------------------------------------------------------------

async fn cmd_lookouts(config: &AppConfig) -> Result<()> {
    let pipeline = build_pipeline(config).await?;
    if pipeline.catalog().is_empty() {
        warn!("catalog is empty; there is nothing to look out for");
    }
    let lookouts = pipeline
        .lookouts()
        .await
        .context("failed to derive lookouts")?;
    println!("{}", serde_json::to_string_pretty(lookouts.as_slice())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: actions
// ---------------------------------------------------------------------------

async fn cmd_actions() -> Result<()> {
    let catalog = init_catalog(&ProviderSettings::from_env()).await?;

    println!("Providers:");
    for (id, status) in catalog.health().await {
        println!("  {id:<12} {status}");
    }

    println!("\nActions ({}):", catalog.list_actions().len());
    for action in catalog.list_actions() {
        let required = action.required();
        if required.is_empty() {
            println!("  {:<28} {}", action.name, action.description);
        } else {
            println!(
                "  {:<28} {} (requires: {})",
                action.name,
                action.description,
                required.join(", ")
            );
        }
    }
    println!("\nFingerprint: {}", catalog.fingerprint());
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: runs
// ---------------------------------------------------------------------------

async fn cmd_runs(config: &AppConfig, limit: usize) -> Result<()> {
    let runs = open_run_store(config).await?;
    let recent = runs.list_recent(limit).await?;

    if recent.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for run in &recent {
        let duration = run.finished_at - run.started_at;
        println!(
            "{}  {:<16}  {:>6}ms  {}  {}",
            run.finished_at.format("%Y-%m-%d %H:%M:%S"),
            run.status,
            duration.num_milliseconds(),
            run.run_id,
            run.document
        );
        if let Some(message) = &run.message {
            println!("    {message}");
        }
    }

    let totals: Vec<String> = runs
        .count_by_status()
        .await?
        .into_iter()
        .map(|(status, count)| format!("{status}: {count}"))
        .collect();
    println!("\n{}", totals.join(", "));
    Ok(())
}
