use anyhow::Result;
use rusqlite::params;

use super::RelayStore;
use crate::core::jobs::JobKind;

impl RelayStore {
    /// Count submissions for one user/category inside the rolling window.
    /// Entries older than the window are pruned lazily on each check
    /// rather than by a background sweeper.
    pub async fn count_recent_usage(
        &self,
        owner_id: &str,
        category: JobKind,
        window_start_ms: i64,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        db.execute(
            "DELETE FROM quota_events
             WHERE owner_id = ?1 AND category = ?2 AND submitted_at_ms <= ?3",
            params![owner_id, category.as_str(), window_start_ms],
        )?;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM quota_events
             WHERE owner_id = ?1 AND category = ?2 AND submitted_at_ms > ?3",
            params![owner_id, category.as_str(), window_start_ms],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub async fn record_usage(
        &self,
        owner_id: &str,
        category: JobKind,
        submitted_at_ms: i64,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO quota_events (owner_id, category, submitted_at_ms) VALUES (?1, ?2, ?3)",
            params![owner_id, category.as_str(), submitted_at_ms],
        )?;
        Ok(())
    }
}
