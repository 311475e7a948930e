//! Run record persistence.
//!
//! One row per processed document: terminal status, message, the full
//! report as JSON and start / finish times (unix milliseconds).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A persisted run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub run_id: String,
    pub document: String,
    /// `success`, `parse_error` or `processing_error`.
    pub status: String,
    pub message: Option<String>,
    /// The run report as produced by the pipeline.
    pub report: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════
//  RunStore
// ═══════════════════════════════════════════════════════════════════════

/// Reads and writes run records.
#[derive(Debug, Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a run, replacing any earlier record with the same id.
    #[instrument(skip(self, run), fields(run_id = %run.run_id))]
    pub async fn record(&self, run: &StoredRun) -> StoreResult<()> {
        if run.run_id.is_empty() {
            return Err(StoreError::InvalidArgument("run id must not be empty".into()));
        }
        let report = serde_json::to_string(&run.report)?;
        let run = run.clone();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO runs \
                     (run_id, document, status, message, report, started_at, finished_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        run.run_id,
                        run.document,
                        run.status,
                        run.message,
                        report,
                        run.started_at.timestamp_millis(),
                        run.finished_at.timestamp_millis(),
                    ],
                )?;
                debug!(run_id = %run.run_id, status = %run.status, "run recorded");
                Ok(())
            })
            .await
    }

    /// Fetch a run by id, `None` if unknown.
    #[instrument(skip(self))]
    pub async fn get(&self, run_id: &str) -> StoreResult<Option<StoredRun>> {
        let run_id = run_id.to_owned();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT run_id, document, status, message, report, started_at, finished_at \
                     FROM runs WHERE run_id = ?1",
                    rusqlite::params![run_id],
                    RunRow::from_row,
                );
                match result {
                    Ok(row) => row.into_stored_run().map(Some),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// The most recently finished runs, newest first.
    #[instrument(skip(self))]
    pub async fn list_recent(&self, limit: usize) -> StoreResult<Vec<StoredRun>> {
        let limit = i64::try_from(limit)
            .map_err(|_| StoreError::InvalidArgument(format!("limit {limit} is too large")))?;
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT run_id, document, status, message, report, started_at, finished_at \
                     FROM runs ORDER BY finished_at DESC, run_id DESC LIMIT ?1",
                )?;
                let rows = stmt.query_map(rusqlite::params![limit], RunRow::from_row)?;
                rows.map(|row| row.map_err(StoreError::from)?.into_stored_run())
                    .collect()
            })
            .await
    }

    /// Number of stored runs per status, sorted by status.
    pub async fn count_by_status(&self) -> StoreResult<Vec<(String, i64)>> {
        self.db
            .execute(|conn| {
                let mut stmt = conn
                    .prepare("SELECT status, COUNT(*) FROM runs GROUP BY status ORDER BY status")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal row mapping
// ═══════════════════════════════════════════════════════════════════════

/// Raw row; JSON and timestamps are decoded outside the rusqlite closure.
struct RunRow {
    run_id: String,
    document: String,
    status: String,
    message: Option<String>,
    report: String,
    started_at: i64,
    finished_at: i64,
}

impl RunRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            run_id: row.get(0)?,
            document: row.get(1)?,
            status: row.get(2)?,
            message: row.get(3)?,
            report: row.get(4)?,
            started_at: row.get(5)?,
            finished_at: row.get(6)?,
        })
    }

    fn into_stored_run(self) -> StoreResult<StoredRun> {
        let run_id = self.run_id.clone();
        let timestamp = |millis: i64| {
            DateTime::from_timestamp_millis(millis).ok_or_else(|| StoreError::CorruptRun {
                run_id: run_id.clone(),
                reason: format!("timestamp {millis} out of range"),
            })
        };
        Ok(StoredRun {
            report: serde_json::from_str(&self.report)?,
            started_at: timestamp(self.started_at)?,
            finished_at: timestamp(self.finished_at)?,
            run_id: self.run_id,
            document: self.document,
            status: self.status,
            message: self.message,
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────
