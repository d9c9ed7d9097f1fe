use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::{
    db::Database,
    storage::{RecordKey, RecordStore},
};

impl Database {
    pub async fn get_record(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM records WHERE key = ?1",
                    params![key.as_str()],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("failed to read record {}", key.as_str()))?;

            raw.map(|raw| {
                serde_json::from_str::<serde_json::Value>(&raw)
                    .with_context(|| format!("record {} is not valid JSON", key.as_str()))
            })
            .transpose()
        })
        .await
    }

    pub async fn put_record(&self, key: RecordKey, value: serde_json::Value) -> Result<()> {
        let serialized = serde_json::to_string(&value)?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key.as_str(), serialized, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to write record {}", key.as_str()))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn load(&self, key: RecordKey) -> Result<Option<serde_json::Value>> {
        self.get_record(key).await
    }

    async fn save(&self, key: RecordKey, value: serde_json::Value) -> Result<()> {
        self.put_record(key, value).await
    }
}
