mod jobs;
mod library;
mod quota;
mod types;
mod users;

pub use types::{ApiKeyRecord, LibraryMediaRecord, LibraryTrackRecord, Plan, TransitionOutcome};

use anyhow::Result;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// Durable backing store for the Job Ledger, Quota Ledger, user/key
/// records, and the per-user media library.
///
/// The single connection mutex doubles as the serialization point for the
/// read-then-conditional-write in `transition_job`, which is what makes the
/// poll-vs-webhook race on one internal id safe without a per-job lock.
pub struct RelayStore {
    db: Arc<Mutex<Connection>>,
    data_dir: PathBuf,
}

impl RelayStore {
    pub async fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).await?;
        }

        let db_path = data_dir.join("relay.db");
        let db = Connection::open(&db_path)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS jobs (
                internal_id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                state TEXT NOT NULL,
                upstream_handle TEXT,
                vendor_task_id TEXT,
                params_json TEXT NOT NULL,
                result_json TEXT,
                progress TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                resolved_at DATETIME
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS upstream_index (
                vendor_task_id TEXT PRIMARY KEY,
                internal_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS quota_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                owner_id TEXT NOT NULL,
                category TEXT NOT NULL,
                submitted_at_ms INTEGER NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS users (
                owner_id TEXT PRIMARY KEY,
                plan TEXT NOT NULL DEFAULT 'FREE',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS api_keys (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                name TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                active INTEGER NOT NULL DEFAULT 1,
                usage_count INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS library_tracks (
                owner_id TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                style TEXT NOT NULL,
                audio_url TEXT,
                image_url TEXT,
                duration REAL NOT NULL DEFAULT 0,
                model TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (owner_id, id)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS library_images (
                owner_id TEXT NOT NULL,
                id TEXT NOT NULL,
                url TEXT NOT NULL,
                prompt TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (owner_id, id)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS library_videos (
                owner_id TEXT NOT NULL,
                id TEXT NOT NULL,
                url TEXT NOT NULL,
                prompt TEXT NOT NULL DEFAULT '',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (owner_id, id)
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_id)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_quota_owner_cat_ts
             ON quota_events(owner_id, category, submitted_at_ms)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_upstream_internal ON upstream_index(internal_id)",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            data_dir,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

#[cfg(test)]
pub async fn test_store() -> RelayStore {
    let dir = std::env::temp_dir().join(format!("prismgen-test-{}", uuid::Uuid::new_v4().simple()));
    RelayStore::new(&dir).await.expect("store should initialize")
}
