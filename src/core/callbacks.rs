use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::core::engine::normalize_result;
use crate::core::jobs::{JobKind, JobState, NormalizedResult};
use crate::core::store::{RelayStore, TransitionOutcome};

/// What the ingestor did with a push notification. Only tests look at
/// this; the HTTP layer acks every delivery regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDisposition {
    Resolved,
    Failed,
    Progress,
    /// Unknown task, duplicate delivery, or an unusable payload. Dropped
    /// without touching the ledger.
    Ignored,
}

/// Push-side status ingestion. Vendors post here with their own task id;
/// the upstream index maps it back to ours. Deliveries are idempotent:
/// replays of a terminal notification land on a closed state machine and
/// fall out as no-ops.
pub struct CallbackIngestor {
    store: Arc<RelayStore>,
}

fn inner_payload(payload: &Value) -> &Value {
    payload.get("data").filter(|d| d.is_object()).unwrap_or(payload)
}

fn vendor_task_id(payload: &Value) -> Option<&str> {
    let inner = inner_payload(payload);
    ["task_id", "taskId"]
        .iter()
        .find_map(|k| inner.get(*k).or_else(|| payload.get(*k)).and_then(Value::as_str))
}

fn callback_type(payload: &Value) -> &str {
    let inner = inner_payload(payload);
    ["callbackType", "callback_type"]
        .iter()
        .find_map(|k| inner.get(*k).and_then(Value::as_str))
        .unwrap_or("complete")
}

impl CallbackIngestor {
    pub fn new(store: Arc<RelayStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(
        &self,
        kind: JobKind,
        owner_hint: Option<&str>,
        payload: &Value,
    ) -> CallbackDisposition {
        let Some(vendor_id) = vendor_task_id(payload) else {
            warn!("callback for {} carried no task id", kind.as_str());
            return CallbackDisposition::Ignored;
        };

        let mapping = match self.store.lookup_upstream_ref(vendor_id).await {
            Ok(mapping) => mapping,
            Err(e) => {
                warn!("callback correlation lookup failed: {}", e);
                return CallbackDisposition::Ignored;
            }
        };
        let Some((internal_id, owner_id)) = mapping else {
            info!(
                "callback for unknown vendor task {} ({}) dropped",
                vendor_id,
                kind.as_str()
            );
            return CallbackDisposition::Ignored;
        };

        // The owner baked into the callback URL must agree with the owner
        // recorded at submission time.
        if let Some(hint) = owner_hint {
            if hint != owner_id {
                warn!(
                    "callback owner mismatch for vendor task {}: got {}, expected {}",
                    vendor_id, hint, owner_id
                );
                return CallbackDisposition::Ignored;
            }
        }

        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(200);
        if code != 200 {
            return self.close(&internal_id, JobState::Error, None).await;
        }

        match callback_type(payload) {
            "complete" => {
                let inner = inner_payload(payload);
                match normalize_result(kind, inner) {
                    Some(result) => {
                        let disposition = self
                            .close(&internal_id, JobState::Done, Some(&result))
                            .await;
                        if disposition == CallbackDisposition::Resolved {
                            self.fan_out(kind, &owner_id, &result).await;
                        }
                        disposition
                    }
                    // A "complete" with no artifact is useless; keep the
                    // job open for the pull path.
                    None => CallbackDisposition::Ignored,
                }
            }
            stage => {
                let progress = format!("{}...", stage);
                match self.store.set_job_progress(&internal_id, &progress).await {
                    Ok(true) => CallbackDisposition::Progress,
                    _ => CallbackDisposition::Ignored,
                }
            }
        }
    }

    /// Terminal transitions from the push path leave the row in place;
    /// the pull path owns read-once delivery and retirement.
    async fn close(
        &self,
        internal_id: &str,
        state: JobState,
        result: Option<&NormalizedResult>,
    ) -> CallbackDisposition {
        match self.store.transition_job(internal_id, state, result).await {
            Ok(TransitionOutcome::Applied) => {
                info!("callback closed {} as {}", internal_id, state.as_str());
                if state == JobState::Done {
                    CallbackDisposition::Resolved
                } else {
                    CallbackDisposition::Failed
                }
            }
            Ok(TransitionOutcome::NotFound) | Ok(TransitionOutcome::Conflict) => {
                CallbackDisposition::Ignored
            }
            Err(e) => {
                warn!("callback transition failed for {}: {}", internal_id, e);
                CallbackDisposition::Ignored
            }
        }
    }

    async fn fan_out(&self, kind: JobKind, owner_id: &str, result: &NormalizedResult) {
        if kind != JobKind::Music {
            return;
        }
        if let NormalizedResult::Tracks(tracks) = result {
            if let Err(e) = self.store.save_tracks(owner_id, tracks).await {
                warn!("callback library fan-out failed for {}: {}", owner_id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jobs::{JobRecord, mint_task_id};
    use crate::core::store::test_store;
    use serde_json::json;

    async fn seed(store: &RelayStore, vendor_id: &str) -> String {
        let job = JobRecord {
            internal_id: mint_task_id(JobKind::Music),
            owner_id: "u1".into(),
            kind: JobKind::Music,
            state: JobState::Processing,
            upstream_handle: Some("https://engine.example/task/1".into()),
            vendor_task_id: Some(vendor_id.into()),
            params: json!({}),
            result: None,
            progress: None,
            created_at: String::new(),
            resolved_at: None,
        };
        store.create_job(&job).await.unwrap();
        store
            .put_upstream_ref(vendor_id, &job.internal_id, "u1")
            .await
            .unwrap();
        job.internal_id
    }

    fn complete_payload(vendor_id: &str) -> Value {
        json!({
            "code": 200,
            "msg": "All generated successfully.",
            "data": {
                "callbackType": "complete",
                "task_id": vendor_id,
                "data": [
                    { "id": "t1", "audio_url": "https://cdn.example/t1.mp3", "title": "One" },
                    { "id": "t2", "audio_url": "https://cdn.example/t2.mp3", "title": "Two" }
                ]
            }
        })
    }

    #[tokio::test]
    async fn complete_callback_resolves_job_and_fills_library() {
        let store = Arc::new(test_store().await);
        let internal_id = seed(&store, "vendor-1").await;
        let ingestor = CallbackIngestor::new(store.clone());

        let disposition = ingestor
            .ingest(JobKind::Music, None, &complete_payload("vendor-1"))
            .await;
        assert_eq!(disposition, CallbackDisposition::Resolved);

        // Row stays terminal for the poller to collect; library is filled.
        let job = store.get_job(&internal_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Done);
        assert!(job.result.is_some());
        assert_eq!(store.count_tracks("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn replayed_complete_callback_is_a_no_op() {
        let store = Arc::new(test_store().await);
        seed(&store, "vendor-2").await;
        let ingestor = CallbackIngestor::new(store.clone());

        let payload = complete_payload("vendor-2");
        assert_eq!(
            ingestor.ingest(JobKind::Music, None, &payload).await,
            CallbackDisposition::Resolved
        );
        assert_eq!(
            ingestor.ingest(JobKind::Music, None, &payload).await,
            CallbackDisposition::Ignored
        );
        assert_eq!(store.count_tracks("u1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn error_code_closes_job_as_failed() {
        let store = Arc::new(test_store().await);
        let internal_id = seed(&store, "vendor-3").await;
        let ingestor = CallbackIngestor::new(store.clone());

        let payload = json!({
            "code": 531,
            "msg": "Generation failed",
            "data": { "task_id": "vendor-3" }
        });
        assert_eq!(
            ingestor.ingest(JobKind::Music, None, &payload).await,
            CallbackDisposition::Failed
        );
        let job = store.get_job(&internal_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Error);
    }

    #[tokio::test]
    async fn progress_callback_updates_progress_only() {
        let store = Arc::new(test_store().await);
        let internal_id = seed(&store, "vendor-4").await;
        let ingestor = CallbackIngestor::new(store.clone());

        let payload = json!({
            "code": 200,
            "data": { "callbackType": "first", "task_id": "vendor-4" }
        });
        assert_eq!(
            ingestor.ingest(JobKind::Music, None, &payload).await,
            CallbackDisposition::Progress
        );
        let job = store.get_job(&internal_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.progress.as_deref(), Some("first..."));
    }

    #[tokio::test]
    async fn owner_hint_mismatch_is_dropped() {
        let store = Arc::new(test_store().await);
        let internal_id = seed(&store, "vendor-5").await;
        let ingestor = CallbackIngestor::new(store.clone());

        assert_eq!(
            ingestor
                .ingest(JobKind::Music, Some("intruder"), &complete_payload("vendor-5"))
                .await,
            CallbackDisposition::Ignored
        );
        let job = store.get_job(&internal_id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Processing);

        assert_eq!(
            ingestor
                .ingest(JobKind::Music, Some("u1"), &complete_payload("vendor-5"))
                .await,
            CallbackDisposition::Resolved
        );
    }

    #[tokio::test]
    async fn unknown_vendor_task_is_dropped() {
        let store = Arc::new(test_store().await);
        let ingestor = CallbackIngestor::new(store);
        assert_eq!(
            ingestor
                .ingest(JobKind::Music, None, &complete_payload("stranger"))
                .await,
            CallbackDisposition::Ignored
        );
    }

    #[tokio::test]
    async fn payload_without_task_id_is_dropped() {
        let store = Arc::new(test_store().await);
        let ingestor = CallbackIngestor::new(store);
        let payload = json!({ "code": 200, "data": { "callbackType": "complete" } });
        assert_eq!(
            ingestor.ingest(JobKind::Music, None, &payload).await,
            CallbackDisposition::Ignored
        );
    }
}
