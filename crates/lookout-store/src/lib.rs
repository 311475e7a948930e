//! # lookout-store
//!
//! SQLite persistence for Lookout run records.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  RunStore (run records, recent runs)    │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL + mmap)         │
//! │  Migrations (versioned, transactional)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use lookout_store::{Database, RunStore};
//!
//! let db = Database::open_and_migrate("data/lookout.db").await?;
//! let runs = RunStore::new(db);
//! let recent = runs.list_recent(20).await?;
//! ```

pub mod db;
pub mod error;
pub mod migration;
pub mod run_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use run_store::{RunStore, StoredRun};
