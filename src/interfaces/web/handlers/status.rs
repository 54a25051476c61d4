use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use super::super::AppState;
use super::super::auth::OwnerId;
use crate::core::error::RelayError;
use crate::core::reconcile::StatusReport;

/// Pull-side status check. Terminal answers are read-once: the first poll
/// that sees one also retires the job, and later polls get a 404.
pub async fn status_endpoint(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Response, RelayError> {
    let report = state.reconciler.check(&owner.0, &task_id).await?;
    let response = match report {
        StatusReport::Pending { state, progress } => Json(serde_json::json!({
            "ok": true,
            "status": state,
            "progress": progress,
        }))
        .into_response(),
        StatusReport::Done { result } => Json(serde_json::json!({
            "ok": true,
            "status": "done",
            "result": result,
        }))
        .into_response(),
        StatusReport::Failed { message } => Json(serde_json::json!({
            "ok": false,
            "status": "error",
            "message": message,
        }))
        .into_response(),
        StatusReport::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "ok": false,
                "status": "not_found",
            })),
        )
            .into_response(),
    };
    Ok(response)
}
