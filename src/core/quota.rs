use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::core::error::RelayError;
use crate::core::jobs::JobKind;
use crate::core::store::{Plan, RelayStore};

const WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Rolling 24h submission gate, per user per kind. The check and the
/// usage write are deliberately split: `admit` is read-only and `record`
/// runs only after the engine adapter accepted the job, so a failed
/// upstream call never burns quota.
pub struct QuotaLedger {
    store: Arc<RelayStore>,
}

/// Daily ceiling for a kind under a plan. Zero means the kind is gated
/// behind the paid tier entirely.
pub fn ceiling(kind: JobKind, plan: Plan) -> i64 {
    match (kind, plan) {
        (JobKind::Music, Plan::Free) => 2,
        (JobKind::Music, Plan::Pro) => 50,
        (JobKind::Image, Plan::Free) => 2,
        (JobKind::Image, Plan::Pro) => 50,
        (JobKind::Video, Plan::Free) => 3,
        (JobKind::Video, Plan::Pro) => 50,
        (JobKind::Tts, Plan::Free) => 10,
        (JobKind::Tts, Plan::Pro) => 1000,
        (JobKind::Extraction, Plan::Free) => 5,
        (JobKind::Extraction, Plan::Pro) => 50,
        (JobKind::StemSplit | JobKind::FaceSynthesis, Plan::Free) => 0,
        (JobKind::StemSplit | JobKind::FaceSynthesis, Plan::Pro) => 10,
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl QuotaLedger {
    pub fn new(store: Arc<RelayStore>) -> Self {
        Self { store }
    }

    /// Read-only ceiling check. Fails closed: an unreachable store denies
    /// the submission for every kind.
    pub async fn admit(&self, owner_id: &str, kind: JobKind, plan: Plan) -> Result<(), RelayError> {
        let limit = ceiling(kind, plan);
        if limit == 0 {
            return Err(RelayError::QuotaExceeded);
        }

        let window_start = now_ms() - WINDOW_MS;
        let used = self
            .store
            .count_recent_usage(owner_id, kind, window_start)
            .await
            .map_err(|e| RelayError::Persistence(e.to_string()))?;

        if used >= limit {
            return Err(RelayError::QuotaExceeded);
        }
        Ok(())
    }

    /// Append a usage timestamp. Called after the engine accepted the job;
    /// at that point the submission already succeeded, so a write failure
    /// is logged instead of surfaced.
    pub async fn record(&self, owner_id: &str, kind: JobKind) {
        if let Err(e) = self.store.record_usage(owner_id, kind, now_ms()).await {
            warn!(
                "quota usage write failed for {} / {}: {}",
                owner_id,
                kind.as_str(),
                e
            );
        }
    }
}
