use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::core::jobs::random_suffix;
use crate::core::store::{LibraryMediaRecord, LibraryTrackRecord, RelayStore};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Copies vendor-hosted artifacts onto our own storage. Vendor CDN links
/// expire; the library keeps a durable URL when the upload service is
/// configured and falls back to the original link when it is not or when
/// the copy fails.
pub struct Rehoster {
    client: reqwest::Client,
    upload_url: Option<String>,
    upload_key: Option<String>,
}

impl Rehoster {
    pub fn new(
        client: reqwest::Client,
        upload_url: Option<String>,
        upload_key: Option<String>,
    ) -> Self {
        Self {
            client,
            upload_url,
            upload_key,
        }
    }

    pub async fn rehost(&self, source_url: &str) -> String {
        let Some(upload_url) = &self.upload_url else {
            return source_url.to_string();
        };

        let mut req = self
            .client
            .post(upload_url)
            .json(&serde_json::json!({ "url": source_url }))
            .timeout(UPLOAD_TIMEOUT);
        if let Some(key) = &self.upload_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let hosted = async {
            let body: serde_json::Value = req.send().await.ok()?.json().await.ok()?;
            body.get("url").and_then(serde_json::Value::as_str).map(str::to_string)
        }
        .await;

        match hosted {
            Some(url) => url,
            None => {
                warn!("re-host failed, keeping vendor link: {}", source_url);
                source_url.to_string()
            }
        }
    }
}

/// Owner-scoped persistent collections for finished artifacts.
pub struct LibraryService {
    store: Arc<RelayStore>,
    rehoster: Rehoster,
}

impl LibraryService {
    pub fn new(store: Arc<RelayStore>, rehoster: Rehoster) -> Self {
        Self { store, rehoster }
    }

    pub async fn save_image(
        &self,
        owner_id: &str,
        url: &str,
        prompt: &str,
    ) -> anyhow::Result<String> {
        let hosted = self.rehoster.rehost(url).await;
        let id = format!("img_{}", random_suffix(8));
        self.store.save_image(owner_id, &id, &hosted, prompt).await?;
        Ok(id)
    }

    pub async fn save_video(
        &self,
        owner_id: &str,
        url: &str,
        prompt: &str,
    ) -> anyhow::Result<String> {
        let hosted = self.rehoster.rehost(url).await;
        let id = format!("v_{}", random_suffix(8));
        self.store.save_video(owner_id, &id, &hosted, prompt).await?;
        Ok(id)
    }

    pub async fn tracks(&self, owner_id: &str) -> anyhow::Result<Vec<LibraryTrackRecord>> {
        self.store.list_tracks(owner_id).await
    }

    pub async fn media(
        &self,
        owner_id: &str,
        collection: &str,
    ) -> anyhow::Result<Vec<LibraryMediaRecord>> {
        self.store.list_media(owner_id, collection).await
    }

    pub async fn delete(
        &self,
        owner_id: &str,
        collection: &str,
        id: &str,
    ) -> anyhow::Result<bool> {
        self.store.delete_asset(owner_id, collection, id).await
    }
}
