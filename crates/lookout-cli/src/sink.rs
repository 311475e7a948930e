//! Persists run records through the SQLite run store.

use async_trait::async_trait;
use lookout_intent::{IntentError, RunRecord, StatusSink};
use lookout_store::{RunStore, StoredRun};

/// [`StatusSink`] backed by a [`RunStore`].
pub struct StoreSink {
    runs: RunStore,
}

impl StoreSink {
    pub fn new(runs: RunStore) -> Self {
        Self { runs }
    }
}

#[async_trait]
impl StatusSink for StoreSink {
    async fn record(&self, record: &RunRecord) -> lookout_intent::Result<()> {
        let stored = to_stored(record)?;
        self.runs
            .record(&stored)
            .await
            .map_err(|e| IntentError::Sink(e.to_string()))
    }
}

fn to_stored(record: &RunRecord) -> lookout_intent::Result<StoredRun> {
    Ok(StoredRun {
        run_id: record.run_id.clone(),
        document: record.document.clone(),
        status: record.status.as_str().to_owned(),
        message: record.message.clone(),
        report: serde_json::to_value(&record.report)
            .map_err(|e| IntentError::Sink(e.to_string()))?,
        started_at: record.started_at,
        finished_at: record.finished_at,
    })
}
