use axum::{
    Json,
    extract::{Path, State},
};

use super::super::AppState;
use crate::core::error::RelayError;
use crate::core::store::Plan;

#[derive(serde::Deserialize)]
pub struct UpsertUserRequest {
    #[serde(rename = "ownerId")]
    owner_id: String,
    plan: String,
}

pub async fn upsert_user_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<UpsertUserRequest>,
) -> Result<Json<serde_json::Value>, RelayError> {
    if payload.owner_id.trim().is_empty() {
        return Err(RelayError::InvalidInput("ownerId is required".into()));
    }
    let plan = Plan::from_label(&payload.plan);
    state
        .store
        .upsert_user(&payload.owner_id, plan)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "ownerId": payload.owner_id,
        "plan": plan,
    })))
}

#[derive(serde::Deserialize)]
pub struct CreateKeyRequest {
    #[serde(rename = "ownerId")]
    owner_id: String,
    #[serde(default = "default_key_name")]
    name: String,
}

fn default_key_name() -> String {
    "default".to_string()
}

/// Mint an API key. The raw key appears in this response and nowhere else;
/// only its hash is stored.
pub async fn create_key_endpoint(
    State(state): State<AppState>,
    Json(payload): Json<CreateKeyRequest>,
) -> Result<Json<serde_json::Value>, RelayError> {
    if payload.owner_id.trim().is_empty() {
        return Err(RelayError::InvalidInput("ownerId is required".into()));
    }
    let (raw, record) = state
        .store
        .create_api_key(&payload.owner_id, &payload.name)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "key": raw,
        "record": record,
    })))
}

pub async fn list_keys_endpoint(
    Path(owner_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let keys = state
        .store
        .list_api_keys(&owner_id)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    Ok(Json(serde_json::json!({ "ok": true, "keys": keys })))
}

pub async fn delete_key_endpoint(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let removed = state
        .store
        .delete_api_key(&id)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    if removed {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err(RelayError::InvalidInput("key not found".into()))
    }
}
