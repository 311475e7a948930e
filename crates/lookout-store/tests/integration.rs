//! Integration tests for the lookout-store crate.
//!
//! These run the migrations and the run store against a real SQLite file
//! (via tempfile).

use chrono::{DateTime, Duration};
use lookout_store::{Database, RunStore, StoredRun, migration};
use serde_json::json;

fn stored(id: &str, status: &str, offset_secs: i64) -> StoredRun {
    let started = DateTime::from_timestamp_millis(1_740_823_200_000).unwrap();
    StoredRun {
        run_id: id.into(),
        document: "minutes.txt".into(),
        status: status.into(),
        message: None,
        report: json!({
            "runId": id,
            "document": "minutes.txt",
            "status": status,
            "entries": [],
            "counts": {"called": 0, "skipped": 0, "failed": 0}
        }),
        started_at: started,
        finished_at: started + Duration::seconds(offset_secs),
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Database lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn open_and_migrate_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested/lookout.db");

    let db = Database::open_and_migrate(db_path.clone()).await.unwrap();

    let runs: i64 = db
        .execute(|conn| Ok(conn.query_row("SELECT count(*) FROM runs", [], |row| row.get(0))?))
        .await
        .unwrap();
    assert_eq!(runs, 0);
    assert!(db_path.exists());
}

#[tokio::test]
async fn migrating_twice_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("lookout.db");

    let first = Database::open_and_migrate(db_path.clone()).await.unwrap();
    drop(first);

    let db = Database::open_and_migrate(db_path).await.unwrap();
    let version = db
        .execute(|conn| migration::current_version(conn))
        .await
        .unwrap();
    assert_eq!(version, migration::latest_version());
}

// ═══════════════════════════════════════════════════════════════════════
//  Run records survive reopening
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn run_records_persist_across_connections() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("lookout.db");

    {
        let store = RunStore::new(Database::open_and_migrate(db_path.clone()).await.unwrap());
        store.record(&stored("r-1", "success", 2)).await.unwrap();
        store
            .record(&StoredRun {
                message: Some("model unavailable".into()),
                ..stored("r-2", "processing_error", 4)
            })
            .await
            .unwrap();
    }

    let store = RunStore::new(Database::open_and_migrate(db_path).await.unwrap());
    let recent = store.list_recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].run_id, "r-2");
    assert_eq!(recent[0].message.as_deref(), Some("model unavailable"));
    assert_eq!(recent[1].report["counts"]["called"], 0);

    let loaded = store.get("r-1").await.unwrap().unwrap();
    assert_eq!(loaded, stored("r-1", "success", 2));
}

#[tokio::test]
async fn concurrent_writers_share_one_database() {
    let dir = tempfile::tempdir().unwrap();
    let store = RunStore::new(
        Database::open_and_migrate(dir.path().join("lookout.db"))
            .await
            .unwrap(),
    );

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .record(&stored(&format!("run-{i}"), "success", i))
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let counts = store.count_by_status().await.unwrap();
    assert_eq!(counts, vec![("success".to_string(), 8)]);
}
