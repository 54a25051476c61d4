use anyhow::Result;
use rusqlite::params;

use super::RelayStore;
use super::types::{LibraryMediaRecord, LibraryTrackRecord};
use crate::core::jobs::TrackDescriptor;

impl RelayStore {
    /// Batch-insert finished tracks into the user's permanent library.
    /// Keyed by track id, so re-delivering the same result set writes the
    /// same rows instead of duplicating them.
    pub async fn save_tracks(&self, owner_id: &str, tracks: &[TrackDescriptor]) -> Result<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        for track in tracks {
            tx.execute(
                "INSERT OR REPLACE INTO library_tracks
                    (owner_id, id, title, style, audio_url, image_url, duration, model)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    owner_id,
                    track.id,
                    track.title,
                    track.style,
                    track.audio_url,
                    track.image_url,
                    track.duration,
                    track.model,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub async fn list_tracks(&self, owner_id: &str) -> Result<Vec<LibraryTrackRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, title, style, audio_url, image_url, duration, model, created_at
             FROM library_tracks WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(LibraryTrackRecord {
                id: row.get(0)?,
                title: row.get(1)?,
                style: row.get(2)?,
                audio_url: row.get(3)?,
                image_url: row.get(4)?,
                duration: row.get(5)?,
                model: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        let mut tracks = Vec::new();
        for row in rows {
            tracks.push(row?);
        }
        Ok(tracks)
    }

    pub async fn save_image(&self, owner_id: &str, id: &str, url: &str, prompt: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO library_images (owner_id, id, url, prompt)
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, id, url, prompt],
        )?;
        Ok(())
    }

    pub async fn save_video(&self, owner_id: &str, id: &str, url: &str, prompt: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT OR REPLACE INTO library_videos (owner_id, id, url, prompt)
             VALUES (?1, ?2, ?3, ?4)",
            params![owner_id, id, url, prompt],
        )?;
        Ok(())
    }

    pub async fn list_media(
        &self,
        owner_id: &str,
        collection: &str,
    ) -> Result<Vec<LibraryMediaRecord>> {
        let table = match collection {
            "images" => "library_images",
            "videos" => "library_videos",
            _ => return Ok(Vec::new()),
        };
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&format!(
            "SELECT id, url, prompt, created_at FROM {} WHERE owner_id = ?1
             ORDER BY created_at DESC",
            table
        ))?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(LibraryMediaRecord {
                id: row.get(0)?,
                url: row.get(1)?,
                prompt: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub async fn delete_asset(&self, owner_id: &str, collection: &str, id: &str) -> Result<bool> {
        let table = match collection {
            "tracks" => "library_tracks",
            "images" => "library_images",
            "videos" => "library_videos",
            _ => return Ok(false),
        };
        let db = self.db.lock().await;
        let rows = db.execute(
            &format!("DELETE FROM {} WHERE owner_id = ?1 AND id = ?2", table),
            params![owner_id, id],
        )?;
        Ok(rows > 0)
    }

    #[cfg(test)]
    pub async fn count_tracks(&self, owner_id: &str) -> Result<i64> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            "SELECT COUNT(*) FROM library_tracks WHERE owner_id = ?1",
            params![owner_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_store;
    use super::*;

    fn track(id: &str) -> TrackDescriptor {
        TrackDescriptor {
            id: id.to_string(),
            title: "Midnight Drive".into(),
            style: "synthwave".into(),
            audio_url: "https://cdn.example/a.mp3".into(),
            image_url: "https://cdn.example/a.jpg".into(),
            duration: 182.5,
            model: "V5".into(),
        }
    }

    #[tokio::test]
    async fn saving_same_tracks_twice_does_not_duplicate() {
        let store = test_store().await;
        let tracks = vec![track("t1"), track("t2")];
        store.save_tracks("u1", &tracks).await.unwrap();
        store.save_tracks("u1", &tracks).await.unwrap();

        let listed = store.list_tracks("u1").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn assets_are_owner_scoped() {
        let store = test_store().await;
        store.save_image("u1", "i1", "https://cdn.example/x.jpg", "a cat").await.unwrap();
        store.save_video("u2", "v1", "https://cdn.example/y.mp4", "a dog").await.unwrap();

        assert_eq!(store.list_media("u1", "images").await.unwrap().len(), 1);
        assert_eq!(store.list_media("u1", "videos").await.unwrap().len(), 0);
        assert_eq!(store.list_media("u2", "videos").await.unwrap().len(), 1);

        assert!(!store.delete_asset("u2", "images", "i1").await.unwrap());
        assert!(store.delete_asset("u1", "images", "i1").await.unwrap());
    }
}
