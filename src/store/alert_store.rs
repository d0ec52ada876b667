//! CRUD for `AlertBatch`/`AlertDelivery` rows. Deliveries cascade-delete with
//! their parent batch; batches never cascade into workflows/tasks.

use rusqlite::{params, OptionalExtension, Row};

use crate::store::Db;
use crate::tasks::alert::{AlertBatch, AlertDelivery, BatchStatus, DeliveryStatus, ScheduleType};
use crate::utils::error::{WatchError, WatchResult};

#[derive(Clone)]
pub struct AlertStore {
    db: Db,
}

fn row_to_batch(row: &Row<'_>) -> rusqlite::Result<AlertBatch> {
    let schedule_str: String = row.get("schedule_type")?;
    let status_str: String = row.get("status")?;
    let channels_str: String = row.get("channels")?;
    Ok(AlertBatch {
        batch_id: row.get("batch_id")?,
        title: row.get("title")?,
        summary: row.get("summary")?,
        total_items: row.get("total_items")?,
        priority: row.get("priority")?,
        channels: serde_json::from_str(&channels_str).unwrap_or_default(),
        schedule_type: ScheduleType::from_str(&schedule_str).unwrap_or(ScheduleType::Immediate),
        status: BatchStatus::from_str(&status_str).unwrap_or(BatchStatus::Pending),
        sent_at: row.get("sent_at")?,
        delivery_attempts: row.get("delivery_attempts")?,
        last_error: row.get("last_error")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_delivery(row: &Row<'_>) -> rusqlite::Result<AlertDelivery> {
    let status_str: String = row.get("status")?;
    Ok(AlertDelivery {
        delivery_id: row.get("delivery_id")?,
        alert_batch_id: row.get("alert_batch_id")?,
        channel: row.get("channel")?,
        status: DeliveryStatus::from_str(&status_str).unwrap_or(DeliveryStatus::Pending),
        recipient: row.get("recipient")?,
        webhook_url: row.get("webhook_url")?,
        message_id: row.get("message_id")?,
        sent_at: row.get("sent_at")?,
        delivery_time_ms: row.get("delivery_time_ms")?,
        error_message: row.get("error_message")?,
        retry_count: row.get("retry_count")?,
        created_at: row.get("created_at")?,
    })
}

impl AlertStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn insert_batch(&self, batch: &AlertBatch) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute("PRAGMA foreign_keys = ON", []).map_err(WatchError::from)?;
        conn.execute(
            "INSERT INTO alert_batches (
                batch_id, title, summary, total_items, priority, channels, schedule_type,
                status, sent_at, delivery_attempts, last_error, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                batch.batch_id,
                batch.title,
                batch.summary,
                batch.total_items,
                batch.priority,
                serde_json::to_string(&batch.channels).unwrap_or_default(),
                batch.schedule_type.as_str(),
                batch.status.as_str(),
                batch.sent_at,
                batch.delivery_attempts,
                batch.last_error,
                batch.created_at,
            ],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn get_batch(&self, batch_id: &str) -> WatchResult<Option<AlertBatch>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM alert_batches WHERE batch_id = ?1",
            params![batch_id],
            row_to_batch,
        )
        .optional()
        .map_err(WatchError::from)
    }

    pub async fn insert_delivery(&self, delivery: &AlertDelivery) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "INSERT INTO alert_deliveries (
                delivery_id, alert_batch_id, channel, status, recipient, webhook_url, message_id,
                sent_at, delivery_time_ms, error_message, retry_count, created_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                delivery.delivery_id,
                delivery.alert_batch_id,
                delivery.channel,
                delivery.status.as_str(),
                delivery.recipient,
                delivery.webhook_url,
                delivery.message_id,
                delivery.sent_at,
                delivery.delivery_time_ms,
                delivery.error_message,
                delivery.retry_count,
                delivery.created_at,
            ],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn list_deliveries(&self, batch_id: &str) -> WatchResult<Vec<AlertDelivery>> {
        let conn = self.db.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM alert_deliveries WHERE alert_batch_id = ?1 ORDER BY created_at ASC")
            .map_err(WatchError::from)?;
        let rows = stmt.query_map(params![batch_id], row_to_delivery).map_err(WatchError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(WatchError::from)
    }

    pub async fn mark_batch_sent(&self, batch_id: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE alert_batches SET status = 'sent', sent_at = ?1, delivery_attempts = delivery_attempts + 1
             WHERE batch_id = ?2",
            params![chrono::Utc::now(), batch_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn mark_batch_failed(&self, batch_id: &str, error: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE alert_batches SET status = 'failed', last_error = ?1, delivery_attempts = delivery_attempts + 1
             WHERE batch_id = ?2",
            params![error, batch_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    /// Deleting a batch cascades to its deliveries via the foreign key's
    /// `ON DELETE CASCADE`; nothing references tasks or workflows here.
    pub async fn delete_batch(&self, batch_id: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute("PRAGMA foreign_keys = ON", []).map_err(WatchError::from)?;
        conn.execute("DELETE FROM alert_batches WHERE batch_id = ?1", params![batch_id])
            .map_err(WatchError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_batch_cascades_to_deliveries() {
        let db = Db::open(":memory:").await.unwrap();
        let store = AlertStore::new(db);
        let batch = AlertBatch::new("New items", "3 relevant posts", 3, "high", vec!["slack".to_string()], ScheduleType::Immediate);
        store.insert_batch(&batch).await.unwrap();
        let delivery = AlertDelivery::new(&batch.batch_id, "slack");
        store.insert_delivery(&delivery).await.unwrap();

        store.delete_batch(&batch.batch_id).await.unwrap();
        let deliveries = store.list_deliveries(&batch.batch_id).await.unwrap();
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn mark_sent_updates_status() {
        let db = Db::open(":memory:").await.unwrap();
        let store = AlertStore::new(db);
        let batch = AlertBatch::new("t", "s", 1, "low", vec!["email".to_string()], ScheduleType::Daily);
        store.insert_batch(&batch).await.unwrap();
        store.mark_batch_sent(&batch.batch_id).await.unwrap();
        let fetched = store.get_batch(&batch.batch_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, BatchStatus::Sent);
        assert!(fetched.sent_at.is_some());
    }
}
