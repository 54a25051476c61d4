use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use crate::core::error::RelayError;
use crate::core::jobs::{JobKind, JobState, NormalizedResult};

/// One observation of a task from the relay's status endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusSnapshot {
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
    /// The relay no longer knows the task. Either it was never ours or its
    /// terminal report was already collected elsewhere.
    Gone,
}

#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn status(&self, task_id: &str) -> Result<StatusSnapshot, RelayError>;
}

/// Talks to a running relay over HTTP.
pub struct HttpStatusSource {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpStatusSource {
    pub fn new(client: reqwest::Client, base_url: String, api_key: String) -> Self {
        Self {
            client,
            base_url,
            api_key,
        }
    }
}

#[async_trait]
impl StatusSource for HttpStatusSource {
    async fn status(&self, task_id: &str) -> Result<StatusSnapshot, RelayError> {
        let url = format!("{}/api/status/{}", self.base_url, task_id);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(20))
            .send()
            .await
            .map_err(|_| RelayError::UpstreamUnavailable)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(StatusSnapshot::Gone);
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|_| RelayError::UpstreamUnavailable)?;

        match body.get("status").and_then(serde_json::Value::as_str) {
            Some("done") => {
                let result = body
                    .get("result")
                    .cloned()
                    .and_then(|r| serde_json::from_value(r).ok());
                match result {
                    Some(result) => Ok(StatusSnapshot::Done { result }),
                    None => Ok(StatusSnapshot::Failed {
                        message: "empty result".to_string(),
                    }),
                }
            }
            Some("error") => Ok(StatusSnapshot::Failed {
                message: body
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Engine execution failed")
                    .to_string(),
            }),
            Some(state) => Ok(StatusSnapshot::Pending {
                state: JobState::from_status(state).unwrap_or(JobState::Processing),
                progress: body
                    .get("progress")
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string),
            }),
            None => Ok(StatusSnapshot::Gone),
        }
    }
}

/// Lifecycle events a watched task produces, in order: zero or more
/// `Progress`, then exactly one of `Completed`, `Failed`, or `Expired`.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Progress {
        task_id: String,
        state: JobState,
        progress: Option<String>,
    },
    Completed {
        task_id: String,
        result: NormalizedResult,
    },
    Failed {
        task_id: String,
        message: String,
    },
    /// Gave up: the task vanished from the relay or the attempt limit ran
    /// out before a terminal answer arrived.
    Expired {
        task_id: String,
    },
}

const MAX_POLL_ATTEMPTS: u32 = 120;

/// Drives status polling for submitted tasks. Each task is watched by at
/// most one loop; re-watching an id already in flight is a no-op.
#[derive(Clone)]
pub struct JobPoller {
    source: Arc<dyn StatusSource>,
    events: mpsc::Sender<PollEvent>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    interval_override: Option<Duration>,
}

impl JobPoller {
    pub fn new(source: Arc<dyn StatusSource>, events: mpsc::Sender<PollEvent>) -> Self {
        Self {
            source,
            events,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            interval_override: None,
        }
    }

    /// Same poller with a fixed interval for every kind. Used by tests and
    /// callers that want tighter loops than the defaults.
    pub fn with_interval(
        source: Arc<dyn StatusSource>,
        events: mpsc::Sender<PollEvent>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            events,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            interval_override: Some(interval),
        }
    }

    /// Kinds that render quickly get polled harder than long renders.
    pub fn poll_interval(kind: JobKind) -> Duration {
        let secs = match kind {
            JobKind::Tts => 2,
            JobKind::Image | JobKind::Extraction => 3,
            JobKind::Music | JobKind::FaceSynthesis => 5,
            JobKind::Video | JobKind::StemSplit => 8,
        };
        Duration::from_secs(secs)
    }

    /// Start watching a task. Returns false if a loop for this id is
    /// already running.
    pub async fn watch(&self, kind: JobKind, task_id: &str) -> bool {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(task_id.to_string()) {
                return false;
            }
        }

        let poller = self.clone();
        let task_id = task_id.to_string();
        let interval = poller
            .interval_override
            .unwrap_or_else(|| Self::poll_interval(kind));

        tokio::spawn(async move {
            poller.run_loop(&task_id, interval).await;
            poller.in_flight.lock().await.remove(&task_id);
        });
        true
    }

    async fn run_loop(&self, task_id: &str, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        for attempt in 0..MAX_POLL_ATTEMPTS {
            ticker.tick().await;

            let snapshot = match self.source.status(task_id).await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    debug!("poll {} attempt {} failed: {}", task_id, attempt, e);
                    continue;
                }
            };

            let terminal = match snapshot {
                StatusSnapshot::Pending { state, progress } => {
                    self.emit(PollEvent::Progress {
                        task_id: task_id.to_string(),
                        state,
                        progress,
                    })
                    .await;
                    None
                }
                StatusSnapshot::Done { result } => Some(PollEvent::Completed {
                    task_id: task_id.to_string(),
                    result,
                }),
                StatusSnapshot::Failed { message } => Some(PollEvent::Failed {
                    task_id: task_id.to_string(),
                    message,
                }),
                StatusSnapshot::Gone => Some(PollEvent::Expired {
                    task_id: task_id.to_string(),
                }),
            };

            if let Some(event) = terminal {
                self.emit(event).await;
                return;
            }
        }

        self.emit(PollEvent::Expired {
            task_id: task_id.to_string(),
        })
        .await;
    }

    async fn emit(&self, event: PollEvent) {
        if self.events.send(event).await.is_err() {
            warn!("poll event receiver dropped");
        }
    }
}
