use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::core::engine::{UpstreamStatus, classify_payload, normalize_result};
use crate::core::error::RelayError;
use crate::core::jobs::{JobKind, JobRecord, JobState, NormalizedResult};
use crate::core::store::{RelayStore, TransitionOutcome};

/// What a status check tells the client. Terminal reports are delivered
/// exactly once; the ledger row is gone by the time the caller sees one.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusReport {
    Pending {
        state: JobState,
        progress: Option<String>,
    },
    Done {
        result: NormalizedResult,
    },
    Failed {
        message: String,
    },
    NotFound,
}

/// Seam for fetching a raw status payload from a vendor task handle, so
/// reconciliation logic is testable without a network.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(&self, handle: &str) -> Result<Value, RelayError>;
}

const STATUS_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

pub struct HttpUpstreamClient {
    client: reqwest::Client,
    bearer_key: String,
}

impl HttpUpstreamClient {
    pub fn new(client: reqwest::Client, bearer_key: String) -> Self {
        Self { client, bearer_key }
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    async fn fetch(&self, handle: &str) -> Result<Value, RelayError> {
        let response = self
            .client
            .get(handle)
            .header("Authorization", format!("Bearer {}", self.bearer_key))
            .timeout(STATUS_FETCH_TIMEOUT)
            .send()
            .await
            .map_err(|_| RelayError::UpstreamUnavailable)?;

        if response.status().is_client_error() || response.status().is_server_error() {
            return Err(RelayError::UpstreamUnavailable);
        }
        response
            .json()
            .await
            .map_err(|_| RelayError::UpstreamUnavailable)
    }
}

/// Pull-side status reconciliation. Each check reads the ledger, asks the
/// vendor when the job is still open, folds the answer back into the
/// ledger, and hands terminal results to the caller exactly once.
pub struct Reconciler {
    store: Arc<RelayStore>,
    upstream: Arc<dyn UpstreamClient>,
}

impl Reconciler {
    pub fn new(store: Arc<RelayStore>, upstream: Arc<dyn UpstreamClient>) -> Self {
        Self { store, upstream }
    }

    pub async fn check(&self, owner_id: &str, internal_id: &str) -> Result<StatusReport, RelayError> {
        let job = self
            .store
            .get_job(internal_id)
            .await
            .map_err(|e| RelayError::Persistence(e.to_string()))?;

        // A missing row and a foreign row look identical from outside.
        let Some(job) = job else {
            return Ok(StatusReport::NotFound);
        };
        if job.owner_id != owner_id {
            return Ok(StatusReport::NotFound);
        }

        // A webhook may already have resolved the job; deliver and retire.
        if job.state.is_terminal() {
            return self.deliver_terminal(&job).await;
        }

        let Some(handle) = job.upstream_handle.clone() else {
            return Ok(StatusReport::Pending {
                state: job.state,
                progress: job.progress.clone(),
            });
        };

        let payload = match self.upstream.fetch(&handle).await {
            Ok(payload) => payload,
            Err(_) => {
                // Transient vendor trouble never fails the job.
                return Ok(StatusReport::Pending {
                    state: job.state,
                    progress: job.progress.clone(),
                });
            }
        };

        match classify_payload(&payload) {
            UpstreamStatus::Active => {
                self.mark_processing(&job, &payload).await;
                let progress = payload
                    .get("progress")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or(job.progress.clone());
                Ok(StatusReport::Pending {
                    state: JobState::Processing,
                    progress,
                })
            }
            UpstreamStatus::Done => {
                let Some(result) = normalize_result(job.kind, &payload) else {
                    // Finished flag without an extractable result; the
                    // artifact usually shows up on the next poll.
                    return Ok(StatusReport::Pending {
                        state: job.state,
                        progress: job.progress.clone(),
                    });
                };
                self.settle(&job, JobState::Done, Some(&result), None).await
            }
            UpstreamStatus::Failed(message) => {
                self.settle(&job, JobState::Error, None, Some(message)).await
            }
        }
    }

    /// Record the terminal state, fan finished tracks into the library,
    /// then retire the row so the report is read-once.
    async fn settle(
        &self,
        job: &JobRecord,
        state: JobState,
        result: Option<&NormalizedResult>,
        failure: Option<String>,
    ) -> Result<StatusReport, RelayError> {
        let outcome = self
            .store
            .transition_job(&job.internal_id, state, result)
            .await
            .map_err(|e| RelayError::Persistence(e.to_string()))?;

        match outcome {
            TransitionOutcome::Applied => {}
            // Another check already delivered and retired this job.
            TransitionOutcome::NotFound => return Ok(StatusReport::NotFound),
            // A webhook closed the job between our read and this write.
            // Its terminal record wins; deliver that instead of ours.
            TransitionOutcome::Conflict => {
                let closed = self
                    .store
                    .get_job(&job.internal_id)
                    .await
                    .map_err(|e| RelayError::Persistence(e.to_string()))?;
                return match closed {
                    Some(ref closed) if closed.state.is_terminal() => {
                        self.deliver_terminal(closed).await
                    }
                    _ => Ok(StatusReport::NotFound),
                };
            }
        }

        if state == JobState::Done {
            if let Some(result) = result {
                self.fan_out(job, result).await;
            }
        }

        if let Err(e) = self.store.delete_job(&job.internal_id).await {
            warn!("failed to retire resolved job {}: {}", job.internal_id, e);
        }

        match state {
            JobState::Done => {
                info!("job {} resolved", job.internal_id);
                Ok(StatusReport::Done {
                    result: result.cloned().ok_or_else(|| {
                        RelayError::Persistence("terminal success without result".into())
                    })?,
                })
            }
            _ => Ok(StatusReport::Failed {
                message: failure.unwrap_or_else(|| "Engine execution failed".into()),
            }),
        }
    }

    async fn deliver_terminal(&self, job: &JobRecord) -> Result<StatusReport, RelayError> {
        if let Err(e) = self.store.delete_job(&job.internal_id).await {
            warn!("failed to retire resolved job {}: {}", job.internal_id, e);
        }
        match (job.state, &job.result) {
            (JobState::Done, Some(result)) => Ok(StatusReport::Done {
                result: result.clone(),
            }),
            (JobState::Done, None) => Ok(StatusReport::Failed {
                message: "Engine execution failed".into(),
            }),
            _ => Ok(StatusReport::Failed {
                message: job
                    .progress
                    .clone()
                    .unwrap_or_else(|| "Engine execution failed".into()),
            }),
        }
    }

    async fn mark_processing(&self, job: &JobRecord, payload: &Value) {
        if job.state == JobState::Pending {
            if let Err(e) = self
                .store
                .transition_job(&job.internal_id, JobState::Processing, None)
                .await
            {
                warn!("failed to mark {} processing: {}", job.internal_id, e);
            }
        }
        if let Some(progress) = payload.get("progress").and_then(Value::as_str) {
            let _ = self.store.set_job_progress(&job.internal_id, progress).await;
        }
    }

    /// Library writes are best effort. The result was already delivered;
    /// losing the library copy is recoverable, losing the delivery is not.
    async fn fan_out(&self, job: &JobRecord, result: &NormalizedResult) {
        if job.kind != JobKind::Music {
            return;
        }
        if let NormalizedResult::Tracks(tracks) = result {
            if let Err(e) = self.store.save_tracks(&job.owner_id, tracks).await {
                warn!(
                    "library fan-out failed for {} ({} tracks): {}",
                    job.owner_id,
                    tracks.len(),
                    e
                );
            }
        }
    }
}
