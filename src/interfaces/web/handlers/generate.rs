use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::info;

use super::super::AppState;
use super::super::auth::OwnerId;
use crate::core::engine::SubmitOutcome;
use crate::core::error::RelayError;
use crate::core::jobs::{
    JobKind, JobRecord, JobState, NormalizedResult, SubmissionRequest, mint_task_id,
};
use crate::core::store::RelayStore;

/// Submission pipeline: quota gate, engine hand-off, ledger write. The
/// usage timestamp is recorded only after the engine accepted the job.
pub async fn generate_endpoint(
    Path(kind): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    Json(request): Json<SubmissionRequest>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let Some(kind) = JobKind::from_str(&kind) else {
        return Err(RelayError::InvalidInput(format!(
            "unknown generation kind: {}",
            kind
        )));
    };

    let plan = state
        .store
        .get_plan(&owner.0)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    state.quota.admit(&owner.0, kind, plan).await?;

    let Some(adapter) = state.engines.get(kind) else {
        return Err(RelayError::UpstreamUnavailable);
    };

    let outcome = adapter.submit(&owner.0, &request).await?;
    state.quota.record(&owner.0, kind).await;

    let params = serde_json::to_value(&request).unwrap_or(serde_json::Value::Null);
    match outcome {
        SubmitOutcome::Immediate(result) => {
            // Synchronous results go into the ledger as already-terminal
            // rows; the first status poll delivers them read-once like
            // everything else.
            let job = JobRecord {
                internal_id: mint_task_id(kind),
                owner_id: owner.0.clone(),
                kind,
                state: JobState::Done,
                upstream_handle: None,
                vendor_task_id: None,
                params,
                result: Some(result.clone()),
                progress: None,
                created_at: String::new(),
                resolved_at: None,
            };
            let internal_id = persist_job(&state.store, job).await?;
            fan_out(&state, &owner.0, kind, &result).await;
            info!("{} finished synchronously as {}", kind.as_str(), internal_id);
            Ok(Json(serde_json::json!({
                "ok": true,
                "taskId": internal_id,
                "status": "done",
            })))
        }
        SubmitOutcome::Pending {
            upstream_handle,
            vendor_task_id,
        } => {
            let job = JobRecord {
                internal_id: mint_task_id(kind),
                owner_id: owner.0.clone(),
                kind,
                state: JobState::Pending,
                upstream_handle: Some(upstream_handle),
                vendor_task_id: vendor_task_id.clone(),
                params,
                result: None,
                progress: None,
                created_at: String::new(),
                resolved_at: None,
            };
            let internal_id = persist_job(&state.store, job).await?;
            if let Some(vendor_id) = &vendor_task_id {
                state
                    .store
                    .put_upstream_ref(vendor_id, &internal_id, &owner.0)
                    .await
                    .map_err(|e| RelayError::Persistence(e.to_string()))?;
            }
            info!("{} accepted as {}", kind.as_str(), internal_id);
            Ok(Json(serde_json::json!({
                "ok": true,
                "taskId": internal_id,
                "status": "pending",
            })))
        }
    }
}

/// Insert the ledger row, retrying once under a fresh id. The engine
/// already accepted the job, so losing the row loses the result; an id
/// collision would fail identically on replay, hence the re-mint.
async fn persist_job(store: &RelayStore, mut job: JobRecord) -> Result<String, RelayError> {
    if store.create_job(&job).await.is_ok() {
        return Ok(job.internal_id);
    }
    job.internal_id = mint_task_id(job.kind);
    store
        .create_job(&job)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    Ok(job.internal_id)
}

async fn fan_out(state: &AppState, owner_id: &str, kind: JobKind, result: &NormalizedResult) {
    if kind != JobKind::Music {
        return;
    }
    if let NormalizedResult::Tracks(tracks) = result {
        if let Err(e) = state.store.save_tracks(owner_id, tracks).await {
            tracing::warn!("library fan-out failed for {}: {}", owner_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;

    fn pending_job(internal_id: &str) -> JobRecord {
        JobRecord {
            internal_id: internal_id.to_string(),
            owner_id: "u1".into(),
            kind: JobKind::Image,
            state: JobState::Pending,
            upstream_handle: Some("https://engine.example/task/1".into()),
            vendor_task_id: None,
            params: serde_json::json!({}),
            result: None,
            progress: None,
            created_at: String::new(),
            resolved_at: None,
        }
    }

    #[tokio::test]
    async fn id_collision_is_retried_under_a_fresh_id() {
        let store = test_store().await;
        let taken = mint_task_id(JobKind::Image);
        store.create_job(&pending_job(&taken)).await.unwrap();

        let persisted = persist_job(&store, pending_job(&taken)).await.unwrap();
        assert_ne!(persisted, taken);
        assert!(store.get_job(&persisted).await.unwrap().is_some());
    }
}
