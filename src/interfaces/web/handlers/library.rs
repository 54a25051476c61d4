use axum::{
    Extension, Json,
    extract::{Path, State},
};

use super::super::AppState;
use super::super::auth::OwnerId;
use crate::core::error::RelayError;

pub async fn list_tracks_endpoint(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<serde_json::Value>, RelayError> {
    let tracks = state
        .library
        .tracks(&owner.0)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    Ok(Json(serde_json::json!({ "ok": true, "tracks": tracks })))
}

pub async fn list_media_endpoint(
    Path(collection): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<serde_json::Value>, RelayError> {
    require_media_collection(&collection)?;
    let items = state
        .library
        .media(&owner.0, &collection)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    Ok(Json(serde_json::json!({ "ok": true, "items": items })))
}

#[derive(serde::Deserialize)]
pub struct SaveAssetRequest {
    url: String,
    #[serde(default)]
    prompt: String,
}

/// Persist a finished artifact into the owner's collection, re-hosting it
/// off the vendor CDN when the upload service is available.
pub async fn save_media_endpoint(
    Path(collection): Path<String>,
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    Json(payload): Json<SaveAssetRequest>,
) -> Result<Json<serde_json::Value>, RelayError> {
    require_media_collection(&collection)?;
    if payload.url.trim().is_empty() {
        return Err(RelayError::InvalidInput("url is required".into()));
    }

    let saved = match collection.as_str() {
        "images" => state.library.save_image(&owner.0, &payload.url, &payload.prompt).await,
        _ => state.library.save_video(&owner.0, &payload.url, &payload.prompt).await,
    };
    let id = saved.map_err(|e| RelayError::Persistence(e.to_string()))?;
    Ok(Json(serde_json::json!({ "ok": true, "id": id })))
}

pub async fn delete_asset_endpoint(
    Path((collection, id)): Path<(String, String)>,
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<serde_json::Value>, RelayError> {
    if !matches!(collection.as_str(), "tracks" | "images" | "videos") {
        return Err(RelayError::InvalidInput(format!(
            "unknown collection: {}",
            collection
        )));
    }
    let removed = state
        .library
        .delete(&owner.0, &collection, &id)
        .await
        .map_err(|e| RelayError::Persistence(e.to_string()))?;
    if removed {
        Ok(Json(serde_json::json!({ "ok": true })))
    } else {
        Err(RelayError::InvalidInput("asset not found".into()))
    }
}

fn require_media_collection(collection: &str) -> Result<(), RelayError> {
    if matches!(collection, "images" | "videos") {
        Ok(())
    } else {
        Err(RelayError::InvalidInput(format!(
            "unknown collection: {}",
            collection
        )))
    }
}
