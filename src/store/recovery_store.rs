//! CRUD for `TaskRecovery` rows.

use rusqlite::{params, OptionalExtension, Row};

use crate::store::Db;
use crate::tasks::recovery::{RecoveryStatus, RecoveryStrategy, TaskRecovery};
use crate::utils::error::{WatchError, WatchResult};

#[derive(Clone)]
pub struct RecoveryStore {
    db: Db,
}

fn row_to_recovery(row: &Row<'_>) -> rusqlite::Result<TaskRecovery> {
    let strategy_str: String = row.get("recovery_strategy")?;
    let status_str: String = row.get("recovery_status")?;
    let checkpoint_str: Option<String> = row.get("checkpoint_data")?;
    Ok(TaskRecovery {
        task_id: row.get("task_id")?,
        original_task_id: row.get("original_task_id")?,
        recovery_strategy: RecoveryStrategy::from_str(&strategy_str).unwrap_or(RecoveryStrategy::Manual),
        recovery_status: RecoveryStatus::from_str(&status_str).unwrap_or(RecoveryStatus::Pending),
        recovery_attempt: row.get("recovery_attempt")?,
        max_recovery_attempts: row.get("max_recovery_attempts")?,
        checkpoint_data: checkpoint_str.and_then(|s| serde_json::from_str(&s).ok()),
        failure_reason: row.get("failure_reason")?,
        recovery_started_at: row.get("recovery_started_at")?,
        recovery_completed_at: row.get("recovery_completed_at")?,
        recovery_error: row.get("recovery_error")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl RecoveryStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn insert(&self, recovery: &TaskRecovery) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "INSERT INTO task_recoveries (
                task_id, original_task_id, recovery_strategy, recovery_status, recovery_attempt,
                max_recovery_attempts, checkpoint_data, failure_reason, recovery_started_at,
                recovery_completed_at, recovery_error, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                recovery.task_id,
                recovery.original_task_id,
                recovery.recovery_strategy.as_str(),
                recovery.recovery_status.as_str(),
                recovery.recovery_attempt,
                recovery.max_recovery_attempts,
                recovery.checkpoint_data.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()),
                recovery.failure_reason,
                recovery.recovery_started_at,
                recovery.recovery_completed_at,
                recovery.recovery_error,
                recovery.created_at,
                recovery.updated_at,
            ],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> WatchResult<Option<TaskRecovery>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM task_recoveries WHERE task_id = ?1",
            params![task_id],
            row_to_recovery,
        )
        .optional()
        .map_err(WatchError::from)
    }

    pub async fn update_status(
        &self,
        task_id: &str,
        status: RecoveryStatus,
        recovery_error: Option<&str>,
    ) -> WatchResult<()> {
        let now = chrono::Utc::now();
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE task_recoveries SET recovery_status = ?1, recovery_error = ?2,
                recovery_attempt = recovery_attempt + 1, updated_at = ?3,
                recovery_completed_at = CASE WHEN ?1 IN ('completed', 'failed') THEN ?3 ELSE recovery_completed_at END
             WHERE task_id = ?4",
            params![status.as_str(), recovery_error, now, task_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn list_pending(&self) -> WatchResult<Vec<TaskRecovery>> {
        let conn = self.db.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM task_recoveries WHERE recovery_status = 'pending' ORDER BY created_at ASC")
            .map_err(WatchError::from)?;
        let rows = stmt.query_map([], row_to_recovery).map_err(WatchError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(WatchError::from)
    }

    pub async fn get_by_original_task(&self, original_task_id: &str) -> WatchResult<Option<TaskRecovery>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM task_recoveries WHERE original_task_id = ?1 ORDER BY created_at DESC LIMIT 1",
            params![original_task_id],
            row_to_recovery,
        )
        .optional()
        .map_err(WatchError::from)
    }

    pub async fn set_checkpoint(&self, task_id: &str, checkpoint_data: &serde_json::Value) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE task_recoveries SET checkpoint_data = ?1, updated_at = ?2 WHERE task_id = ?3",
            params![serde_json::to_string(checkpoint_data).unwrap_or_default(), chrono::Utc::now(), task_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    /// Delete completed/failed recovery rows older than `max_age_secs`
    /// (the recovery daemon's periodic cleanup step).
    pub async fn delete_completed_older_than(&self, now: chrono::DateTime<chrono::Utc>, max_age_secs: i64) -> WatchResult<u64> {
        let cutoff = now - chrono::Duration::seconds(max_age_secs);
        let conn = self.db.conn.lock().await;
        let deleted = conn
            .execute(
                "DELETE FROM task_recoveries WHERE recovery_status IN ('completed', 'failed') AND recovery_completed_at < ?1",
                params![cutoff],
            )
            .map_err(WatchError::from)?;
        Ok(deleted as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_and_update_status() {
        let db = Db::open(":memory:").await.unwrap();
        let store = RecoveryStore::new(db);
        let recovery = TaskRecovery::new("task-1", RecoveryStrategy::Retry, Some("timeout".to_string()));
        let task_id = recovery.task_id.clone();
        store.insert(&recovery).await.unwrap();

        store.update_status(&task_id, RecoveryStatus::Completed, None).await.unwrap();
        let fetched = store.get(&task_id).await.unwrap().unwrap();
        assert_eq!(fetched.recovery_status, RecoveryStatus::Completed);
        assert_eq!(fetched.recovery_attempt, 1);
        assert!(fetched.recovery_completed_at.is_some());
    }
}
