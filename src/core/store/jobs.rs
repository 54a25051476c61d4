use anyhow::{Result, anyhow};
use rusqlite::{OptionalExtension, params};

use super::RelayStore;
use super::types::TransitionOutcome;
use crate::core::jobs::{JobKind, JobRecord, JobState, NormalizedResult, can_transition};

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let kind_str: String = row.get(2)?;
    let state_str: String = row.get(3)?;
    let params_json: String = row.get(6)?;
    let result_json: Option<String> = row.get(7)?;

    Ok(JobRecord {
        internal_id: row.get(0)?,
        owner_id: row.get(1)?,
        kind: JobKind::from_str(&kind_str).unwrap_or(JobKind::Music),
        state: JobState::from_status(&state_str).unwrap_or(JobState::Pending),
        upstream_handle: row.get(4)?,
        vendor_task_id: row.get(5)?,
        params: serde_json::from_str(&params_json).unwrap_or(serde_json::Value::Null),
        result: result_json.and_then(|r| serde_json::from_str::<NormalizedResult>(&r).ok()),
        progress: row.get(8)?,
        created_at: row.get(9)?,
        resolved_at: row.get(10)?,
    })
}

const JOB_COLUMNS: &str = "internal_id, owner_id, kind, state, upstream_handle, vendor_task_id,
    params_json, result_json, progress, created_at, resolved_at";

impl RelayStore {
    /// Insert a new job record. A colliding internal id is an error, never
    /// a silent overwrite.
    pub async fn create_job(&self, job: &JobRecord) -> Result<()> {
        let params_json = serde_json::to_string(&job.params)?;
        let result_json = match &job.result {
            Some(r) => Some(serde_json::to_string(r)?),
            None => None,
        };

        let db = self.db.lock().await;
        let inserted = db.execute(
            "INSERT OR IGNORE INTO jobs
                (internal_id, owner_id, kind, state, upstream_handle, vendor_task_id,
                 params_json, result_json, progress, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL,
                     CASE WHEN ?4 IN ('done', 'error') THEN CURRENT_TIMESTAMP END)",
            params![
                job.internal_id,
                job.owner_id,
                job.kind.as_str(),
                job.state.as_str(),
                job.upstream_handle,
                job.vendor_task_id,
                params_json,
                result_json,
            ],
        )?;
        if inserted == 0 {
            return Err(anyhow!("job id collision: {}", job.internal_id));
        }
        Ok(())
    }

    pub async fn get_job(&self, internal_id: &str) -> Result<Option<JobRecord>> {
        let db = self.db.lock().await;
        let job = db
            .query_row(
                &format!("SELECT {} FROM jobs WHERE internal_id = ?1", JOB_COLUMNS),
                params![internal_id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    /// Apply a forward state transition under the connection lock, so a
    /// concurrent poll and webhook can never both win the terminal write.
    /// A missing record reports `NotFound`; callers on the terminal path
    /// treat that as already-resolved.
    pub async fn transition_job(
        &self,
        internal_id: &str,
        new_state: JobState,
        result: Option<&NormalizedResult>,
    ) -> Result<TransitionOutcome> {
        let result_json = match result {
            Some(r) => Some(serde_json::to_string(r)?),
            None => None,
        };

        let db = self.db.lock().await;
        let current: Option<String> = db
            .query_row(
                "SELECT state FROM jobs WHERE internal_id = ?1",
                params![internal_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(current) = current else {
            return Ok(TransitionOutcome::NotFound);
        };
        let Some(current) = JobState::from_status(&current) else {
            return Err(anyhow!("corrupt job state for {}", internal_id));
        };

        if !can_transition(current, new_state) {
            return Ok(TransitionOutcome::Conflict);
        }

        if new_state.is_terminal() {
            db.execute(
                "UPDATE jobs SET state = ?1,
                        result_json = COALESCE(?2, result_json),
                        resolved_at = CURRENT_TIMESTAMP
                 WHERE internal_id = ?3",
                params![new_state.as_str(), result_json, internal_id],
            )?;
        } else {
            db.execute(
                "UPDATE jobs SET state = ?1, result_json = COALESCE(?2, result_json)
                 WHERE internal_id = ?3",
                params![new_state.as_str(), result_json, internal_id],
            )?;
        }
        Ok(TransitionOutcome::Applied)
    }

    /// Update the human-readable progress string without touching state.
    pub async fn set_job_progress(&self, internal_id: &str, progress: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE jobs SET progress = ?1 WHERE internal_id = ?2",
            params![progress, internal_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn delete_job(&self, internal_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        db.execute(
            "DELETE FROM upstream_index WHERE internal_id = ?1",
            params![internal_id],
        )?;
        let rows = db.execute(
            "DELETE FROM jobs WHERE internal_id = ?1",
            params![internal_id],
        )?;
        Ok(rows > 0)
    }

    /// Record the vendor-task-id → internal-id correlation for vendors
    /// whose webhooks do not echo back our id.
    pub async fn put_upstream_ref(
        &self,
        vendor_task_id: &str,
        internal_id: &str,
        owner_id: &str,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO upstream_index (vendor_task_id, internal_id, owner_id)
             VALUES (?1, ?2, ?3)",
            params![vendor_task_id, internal_id, owner_id],
        )?;
        Ok(())
    }

    pub async fn lookup_upstream_ref(
        &self,
        vendor_task_id: &str,
    ) -> Result<Option<(String, String)>> {
        let db = self.db.lock().await;
        let pair = db
            .query_row(
                "SELECT internal_id, owner_id FROM upstream_index WHERE vendor_task_id = ?1",
                params![vendor_task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(pair)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;
    use crate::core::jobs::mint_task_id;

    fn pending_job(owner: &str, kind: JobKind) -> JobRecord {
        JobRecord {
            internal_id: mint_task_id(kind),
            owner_id: owner.to_string(),
            kind,
            state: JobState::Pending,
            upstream_handle: Some("https://engine.example/task/abc".into()),
            vendor_task_id: None,
            params: serde_json::json!({ "prompt": "lofi beat" }),
            result: None,
            progress: None,
            created_at: String::new(),
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = test_store().await;
        let job = pending_job("user-1", JobKind::Music);
        store.create_job(&job).await.unwrap();

        let fetched = store.get_job(&job.internal_id).await.unwrap().unwrap();
        assert_eq!(fetched.owner_id, "user-1");
        assert_eq!(fetched.kind, JobKind::Music);
        assert_eq!(fetched.state, JobState::Pending);
        assert_eq!(
            fetched.upstream_handle.as_deref(),
            Some("https://engine.example/task/abc")
        );
    }

    #[tokio::test]
    async fn duplicate_internal_id_is_rejected() {
        let store = test_store().await;
        let job = pending_job("user-1", JobKind::Image);
        store.create_job(&job).await.unwrap();
        assert!(store.create_job(&job).await.is_err());
    }

    #[tokio::test]
    async fn terminal_transition_is_forward_only() {
        let store = test_store().await;
        let job = pending_job("user-1", JobKind::Video);
        store.create_job(&job).await.unwrap();

        let result = NormalizedResult::Url("https://cdn.example/final.mp4".into());
        let outcome = store
            .transition_job(&job.internal_id, JobState::Done, Some(&result))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);

        let outcome = store
            .transition_job(&job.internal_id, JobState::Processing, None)
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Conflict);

        let fetched = store.get_job(&job.internal_id).await.unwrap().unwrap();
        assert_eq!(fetched.state, JobState::Done);
        assert!(fetched.resolved_at.is_some());
        assert_eq!(fetched.result, Some(result));
    }

    #[tokio::test]
    async fn replayed_terminal_write_conflicts_and_keeps_the_first_result() {
        let store = test_store().await;
        let job = pending_job("user-1", JobKind::Video);
        store.create_job(&job).await.unwrap();

        let first = NormalizedResult::Url("https://cdn.example/first.mp4".into());
        let outcome = store
            .transition_job(&job.internal_id, JobState::Done, Some(&first))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied);

        // A duplicate delivery with different contents must not win.
        let second = NormalizedResult::Url("https://cdn.example/second.mp4".into());
        let outcome = store
            .transition_job(&job.internal_id, JobState::Done, Some(&second))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Conflict);

        let fetched = store.get_job(&job.internal_id).await.unwrap().unwrap();
        assert_eq!(fetched.result, Some(first));
    }

    #[tokio::test]
    async fn transition_after_delete_reports_not_found() {
        let store = test_store().await;
        let job = pending_job("user-1", JobKind::Music);
        store.create_job(&job).await.unwrap();
        assert!(store.delete_job(&job.internal_id).await.unwrap());

        let outcome = store
            .transition_job(&job.internal_id, JobState::Done, None)
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::NotFound);
    }

    #[tokio::test]
    async fn progress_updates_do_not_change_state() {
        let store = test_store().await;
        let mut job = pending_job("user-1", JobKind::Music);
        job.state = JobState::Processing;
        store.create_job(&job).await.unwrap();

        assert!(
            store
                .set_job_progress(&job.internal_id, "Synthesis in progress...")
                .await
                .unwrap()
        );
        let fetched = store.get_job(&job.internal_id).await.unwrap().unwrap();
        assert_eq!(fetched.state, JobState::Processing);
        assert_eq!(fetched.progress.as_deref(), Some("Synthesis in progress..."));
    }

    #[tokio::test]
    async fn upstream_ref_lookup_roundtrip() {
        let store = test_store().await;
        let job = pending_job("user-7", JobKind::Music);
        store.create_job(&job).await.unwrap();
        store
            .put_upstream_ref("vendor-123", &job.internal_id, "user-7")
            .await
            .unwrap();

        let (internal, owner) = store
            .lookup_upstream_ref("vendor-123")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(internal, job.internal_id);
        assert_eq!(owner, "user-7");

        store.delete_job(&job.internal_id).await.unwrap();
        assert!(store.lookup_upstream_ref("vendor-123").await.unwrap().is_none());
    }
}
