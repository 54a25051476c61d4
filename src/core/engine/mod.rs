mod normalize;
mod profile;

pub use normalize::{UpstreamStatus, classify_payload, normalize_result, normalize_tracks};
pub use profile::{AuthStyle, EngineProfile, HttpEngineAdapter, WireShape};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::error::RelayError;
use crate::core::jobs::{JobKind, NormalizedResult, SubmissionRequest};

/// What an engine said when we handed it a job.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The engine finished synchronously; no polling needed.
    Immediate(NormalizedResult),
    /// The engine accepted the job and will be queried (or will call back)
    /// later. The handle stays server-side; the vendor task id feeds the
    /// webhook correlation index when present.
    Pending {
        upstream_handle: String,
        vendor_task_id: Option<String>,
    },
}

/// Per-kind seam between the submission pipeline and a vendor wire
/// protocol. Adapters only talk to the network; the caller owns all
/// ledger writes.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn submit(
        &self,
        owner_id: &str,
        request: &SubmissionRequest,
    ) -> Result<SubmitOutcome, RelayError>;
}

pub struct EngineRegistry {
    adapters: HashMap<JobKind, Arc<dyn EngineAdapter>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn EngineAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: JobKind) -> Option<Arc<dyn EngineAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    /// Wire up one HTTP adapter per kind that has an engine URL configured.
    pub fn from_config(config: &AppConfig, client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        for profile in EngineProfile::lineup(config) {
            registry.register(Arc::new(HttpEngineAdapter::new(profile, client.clone())));
        }
        registry
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
