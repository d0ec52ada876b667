//! CRUD for `ContentDedup` rows: the "have we seen this Reddit item before"
//! check the retrieval stage runs on every post/comment.

use rusqlite::{params, OptionalExtension, Row};

use crate::store::Db;
use crate::tasks::dedup::{ContentDedup, ContentType, ProcessingStatus};
use crate::utils::error::{WatchError, WatchResult};

#[derive(Clone)]
pub struct DedupStore {
    db: Db,
}

fn row_to_dedup(row: &Row<'_>) -> rusqlite::Result<ContentDedup> {
    let type_str: String = row.get("content_type")?;
    let status_str: String = row.get("processing_status")?;
    let metadata_str: String = row.get("metadata")?;
    Ok(ContentDedup {
        content_hash: row.get("content_hash")?,
        content_type: ContentType::from_str(&type_str).unwrap_or(ContentType::Post),
        external_id: row.get("external_id")?,
        processing_status: ProcessingStatus::from_str(&status_str).unwrap_or(ProcessingStatus::New),
        first_seen_at: row.get("first_seen_at")?,
        processed_at: row.get("processed_at")?,
        source_agent: row.get("source_agent")?,
        workflow_id: row.get("workflow_id")?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::Value::Null),
    })
}

impl DedupStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert the dedup row if the hash is new. Returns `true` if this call
    /// inserted it (content is new), `false` if it already existed.
    pub async fn register_if_new(&self, entry: &ContentDedup) -> WatchResult<bool> {
        let conn = self.db.conn.lock().await;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO content_dedup (
                content_hash, content_type, external_id, processing_status, first_seen_at,
                processed_at, source_agent, workflow_id, metadata
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            params![
                entry.content_hash,
                entry.content_type.as_str(),
                entry.external_id,
                entry.processing_status.as_str(),
                entry.first_seen_at,
                entry.processed_at,
                entry.source_agent,
                entry.workflow_id,
                serde_json::to_string(&entry.metadata).unwrap_or_default(),
            ],
        )
        .map_err(WatchError::from)?;
        Ok(inserted > 0)
    }

    pub async fn get(&self, content_hash: &str) -> WatchResult<Option<ContentDedup>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM content_dedup WHERE content_hash = ?1",
            params![content_hash],
            row_to_dedup,
        )
        .optional()
        .map_err(WatchError::from)
    }

    pub async fn mark_processed(&self, content_hash: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE content_dedup SET processing_status = 'processed', processed_at = ?1
             WHERE content_hash = ?2",
            params![chrono::Utc::now(), content_hash],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_if_new_detects_repeats() {
        let db = Db::open(":memory:").await.unwrap();
        let store = DedupStore::new(db);
        let entry = ContentDedup::new("hash-abc", ContentType::Post, "t3_123");

        assert!(store.register_if_new(&entry).await.unwrap());
        assert!(!store.register_if_new(&entry).await.unwrap());
    }
}
