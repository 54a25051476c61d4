use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::collections::HashMap;
use tracing::info;

use super::super::AppState;
use crate::core::jobs::JobKind;

/// Vendor push notifications land here. The response is always a 200 ack:
/// engines retry on anything else and a broken payload will not get better
/// on redelivery. Correlation runs off the vendor task id inside the body;
/// the `uid` query parameter, when present, must match the owner recorded
/// at submission time.
pub async fn webhook_endpoint(
    Path(kind): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Json<serde_json::Value> {
    let uid = query.get("uid").map(String::as_str);

    match JobKind::from_str(&kind) {
        Some(kind) => {
            let disposition = state.ingestor.ingest(kind, uid, &payload).await;
            info!(
                "webhook {} (uid {}) handled: {:?}",
                kind.as_str(),
                uid.unwrap_or("-"),
                disposition
            );
        }
        None => {
            info!(
                "webhook for unknown kind {} (uid {}) dropped",
                kind,
                uid.unwrap_or("-")
            );
        }
    }

    Json(serde_json::json!({ "ok": true }))
}
