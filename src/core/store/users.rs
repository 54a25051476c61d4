use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};

use super::RelayStore;
use super::types::{ApiKeyRecord, Plan};

fn hash_key(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_raw_key() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("pgk_{}", hex::encode(bytes))
}

impl RelayStore {
    pub async fn upsert_user(&self, owner_id: &str, plan: Plan) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO users (owner_id, plan) VALUES (?1, ?2)
             ON CONFLICT(owner_id) DO UPDATE SET plan = ?2",
            params![owner_id, plan.as_str()],
        )?;
        Ok(())
    }

    /// Unknown users fall back to the free tier rather than erroring; the
    /// quota ledger is abuse deterrence, not billing.
    pub async fn get_plan(&self, owner_id: &str) -> Result<Plan> {
        let db = self.db.lock().await;
        let label: Option<String> = db
            .query_row(
                "SELECT plan FROM users WHERE owner_id = ?1",
                params![owner_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(label.map(|l| Plan::from_label(&l)).unwrap_or(Plan::Free))
    }

    /// Mint an API key for a user. Only the SHA-256 hash is persisted; the
    /// raw key is returned exactly once.
    pub async fn create_api_key(&self, owner_id: &str, name: &str) -> Result<(String, ApiKeyRecord)> {
        let raw = generate_raw_key();
        let token_hash = hash_key(&raw);
        let id = uuid::Uuid::new_v4().to_string();

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO api_keys (id, owner_id, name, token_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id, owner_id, name, token_hash],
        )?;
        let created_at = db.query_row(
            "SELECT created_at FROM api_keys WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        )?;

        Ok((
            raw,
            ApiKeyRecord {
                id,
                owner_id: owner_id.to_string(),
                name: name.to_string(),
                active: true,
                usage_count: 0,
                created_at,
            },
        ))
    }

    /// The auth black box: bearer credential in, stable owner id out.
    /// Usage counting piggybacks on the same lookup.
    pub async fn resolve_api_key(&self, raw: &str) -> Result<Option<String>> {
        let token_hash = hash_key(raw);
        let db = self.db.lock().await;
        let owner: Option<String> = db
            .query_row(
                "SELECT owner_id FROM api_keys WHERE token_hash = ?1 AND active = 1",
                params![token_hash],
                |row| row.get(0),
            )
            .optional()?;
        if owner.is_some() {
            db.execute(
                "UPDATE api_keys SET usage_count = usage_count + 1 WHERE token_hash = ?1",
                params![token_hash],
            )?;
        }
        Ok(owner)
    }

    /// Whether any key exists at all. The web layer keeps the API open on
    /// loopback until the first key is minted.
    pub async fn has_any_api_keys(&self) -> Result<bool> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM api_keys", [], |row| row.get(0))?;
        Ok(count > 0)
    }

    pub async fn list_api_keys(&self, owner_id: &str) -> Result<Vec<ApiKeyRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, owner_id, name, active, usage_count, created_at
             FROM api_keys WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(ApiKeyRecord {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                name: row.get(2)?,
                active: row.get::<_, i32>(3)? != 0,
                usage_count: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }

    pub async fn delete_api_key(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute("DELETE FROM api_keys WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}
