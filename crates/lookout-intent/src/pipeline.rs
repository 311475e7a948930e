//! End-to-end runs.
//!
//! A [`Pipeline`] processes one document per run: lookouts (cached per
//! catalog), intent extraction, dispatch, report. Runs never fail outright;
//! a run that stops early still yields a report with status `parse_error`
//! or `processing_error` and a fallback summary. Every terminal report is
//! handed to the configured [`StatusSink`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lookout_adapters::{ActionCatalog, DocumentSource};
use lookout_agent::StructuredGenerator;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::LookoutCache;
use crate::dispatcher::{DispatchConfig, Dispatcher};
use crate::document::Document;
use crate::error::{IntentError, Result, Stage};
use crate::extractor::{DocumentIntentExtractor, ExtractorConfig};
use crate::lookouts::LookoutExtractor;
use crate::report::{RunReport, RunStatus};
use crate::types::Lookout;

/// Pipeline tunables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub fetch_timeout: Duration,
    /// Bound on each model call.
    pub generation_timeout: Duration,
    pub dispatch: DispatchConfig,
    pub extractor: ExtractorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            generation_timeout: Duration::from_secs(120),
            dispatch: DispatchConfig::default(),
            extractor: ExtractorConfig::default(),
        }
    }
}

/// What the status sink receives for each finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run_id: String,
    pub document: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub report: RunReport,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunRecord {
    fn from_report(report: &RunReport, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: report.run_id.clone(),
            document: report.document.clone(),
            status: report.status,
            message: report.message.clone(),
            report: report.clone(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}

/// Receives terminal run records.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn record(&self, record: &RunRecord) -> Result<()>;
}

/// Processes documents against an action catalog.
pub struct Pipeline {
    catalog: Arc<ActionCatalog>,
    lookouts: LookoutExtractor,
    intents: DocumentIntentExtractor,
    dispatcher: Dispatcher,
    cache: LookoutCache,
    sink: Option<Arc<dyn StatusSink>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn StructuredGenerator>,
        catalog: Arc<ActionCatalog>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            lookouts: LookoutExtractor::new(Arc::clone(&generator)),
            intents: DocumentIntentExtractor::new(generator)
                .with_config(config.extractor.clone()),
            dispatcher: Dispatcher::new(Arc::clone(&catalog), config.dispatch.clone()),
            catalog,
            cache: LookoutCache::default(),
            sink: None,
            config,
        }
    }

    /// Report every finished run to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Share a lookout cache with other pipelines.
    pub fn with_cache(mut self, cache: LookoutCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &LookoutCache {
        &self.cache
    }

    /// Lookouts for the current catalog, from the cache when possible.
    pub async fn lookouts(&self) -> Result<Arc<Vec<Lookout>>> {
        let fingerprint = self.catalog.fingerprint().to_owned();
        self.cache
            .get_or_extract(
                &fingerprint,
                bounded(
                    Stage::LookoutExtraction,
                    self.config.generation_timeout,
                    self.lookouts.extract(self.catalog.list_actions()),
                ),
            )
            .await
    }

    /// Run a document through every stage.
    pub async fn run(&self, document: Document) -> RunReport {
        let run_id = Uuid::now_v7().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, document = %document.name, "run started");
        let outcome = self.execute(&run_id, &document).await;
        self.finish(&run_id, &document.name, started_at, outcome).await
    }

    /// Fetch `reference` from `source`, then run it.
    pub async fn process(&self, source: &dyn DocumentSource, reference: &str) -> RunReport {
        let run_id = Uuid::now_v7().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, reference = %reference, "run started");

        let fetched = tokio::time::timeout(self.config.fetch_timeout, source.fetch_content(reference))
            .await
            .map_err(|_| IntentError::Timeout {
                stage: Stage::Fetch,
                seconds: self.config.fetch_timeout.as_secs(),
            })
            .and_then(|r| r.map_err(IntentError::from));

        let document = match fetched.and_then(Document::from_fetched) {
            Ok(document) => document,
            Err(e) => return self.finish(&run_id, reference, started_at, Err(e)).await,
        };
        let outcome = self.execute(&run_id, &document).await;
        self.finish(&run_id, &document.name, started_at, outcome).await
    }

    async fn execute(&self, run_id: &str, document: &Document) -> Result<RunReport> {
        let lookouts = self.lookouts().await?;
        let matches = bounded(
            Stage::IntentExtraction,
            self.config.generation_timeout,
            self.intents.extract(document, &lookouts),
        )
        .await?;
        let outcomes = self.dispatcher.dispatch(matches).await;
        Ok(RunReport::success(run_id, &document.name, &outcomes))
    }

    async fn finish(
        &self,
        run_id: &str,
        document: &str,
        started_at: DateTime<Utc>,
        outcome: Result<RunReport>,
    ) -> RunReport {
        let report = match outcome {
            Ok(report) => {
                info!(
                    run_id = %run_id,
                    called = report.counts.called,
                    skipped = report.counts.skipped,
                    failed = report.counts.failed,
                    "run finished"
                );
                report
            }
            Err(e) => {
                let status = if e.is_parse_error() {
                    RunStatus::ParseError
                } else {
                    RunStatus::ProcessingError
                };
                warn!(run_id = %run_id, document = %document, status = %status, error = %e, "run failed");
                RunReport::failure(run_id, document, status, e.to_string())
            }
        };

        if let Some(sink) = &self.sink {
            let record = RunRecord::from_report(&report, started_at);
            if let Err(e) = sink.record(&record).await {
                warn!(run_id = %run_id, error = %e, "status sink rejected run record");
            }
        }
        report
    }
}

async fn bounded<T>(
    stage: Stage,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| IntentError::Timeout {
            stage,
            seconds: limit.as_secs(),
        })?
}
