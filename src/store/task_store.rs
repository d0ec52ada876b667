//! CRUD plus lease/retry operations for `Task` rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::store::Db;
use crate::tasks::task::{Task, TaskStatus};
use crate::utils::error::{WatchError, WatchResult};

#[derive(Clone)]
pub struct TaskStore {
    db: Db,
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    let status_str: String = row.get("status")?;
    let parameters_str: String = row.get("parameters")?;
    let result_data_str: Option<String> = row.get("result_data")?;
    Ok(Task {
        task_id: row.get::<_, String>("task_id")?.parse().unwrap_or_default(),
        agent_type: row.get("agent_type")?,
        skill_name: row.get("skill_name")?,
        parameters: serde_json::from_str(&parameters_str).unwrap_or(serde_json::Value::Null),
        parameters_hash: row.get("parameters_hash")?,
        workflow_id: row.get("workflow_id")?,
        idempotency_key: row.get("idempotency_key")?,
        correlation_id: row.get("correlation_id")?,
        priority: row.get("priority")?,
        status: TaskStatus::from_str(&status_str).unwrap_or(TaskStatus::Pending),
        retry_count: row.get("retry_count")?,
        max_retries: row.get("max_retries")?,
        next_retry_at: row.get("next_retry_at")?,
        lock_token: row.get("lock_token")?,
        lock_expires_at: row.get("lock_expires_at")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
        error_message: row.get("error_message")?,
        result_data: result_data_str.and_then(|s| serde_json::from_str(&s).ok()),
        result_hash: row.get("result_hash")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl TaskStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn insert(&self, task: &Task) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "INSERT INTO tasks (
                task_id, agent_type, skill_name, parameters, parameters_hash, workflow_id,
                idempotency_key, correlation_id, priority, status, retry_count, max_retries,
                next_retry_at, lock_token, lock_expires_at, started_at, completed_at,
                error_message, result_data, result_hash, created_at, updated_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22)",
            params![
                task.task_id.to_string(),
                task.agent_type,
                task.skill_name,
                serde_json::to_string(&task.parameters).unwrap_or_default(),
                task.parameters_hash,
                task.workflow_id,
                task.idempotency_key,
                task.correlation_id,
                task.priority,
                task.status.as_str(),
                task.retry_count,
                task.max_retries,
                task.next_retry_at,
                task.lock_token,
                task.lock_expires_at,
                task.started_at,
                task.completed_at,
                task.error_message,
                task.result_data.as_ref().map(|v| serde_json::to_string(v).unwrap_or_default()),
                task.result_hash,
                task.created_at,
                task.updated_at,
            ],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn get(&self, task_id: &str) -> WatchResult<Option<Task>> {
        let conn = self.db.conn.lock().await;
        conn.query_row("SELECT * FROM tasks WHERE task_id = ?1", params![task_id], row_to_task)
            .optional()
            .map_err(WatchError::from)
    }

    /// Find a non-terminal-for-dedup task with the same identity key. Used
    /// by `idempotency::create_idempotent_task` before inserting a new row.
    pub async fn find_active_by_key(
        &self,
        agent_type: &str,
        skill_name: &str,
        parameters_hash: &str,
        workflow_id: Option<&str>,
    ) -> WatchResult<Option<Task>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM tasks
             WHERE agent_type = ?1 AND skill_name = ?2 AND parameters_hash = ?3
               AND workflow_id IS ?4
               AND status IN ('pending', 'running', 'completed')
             ORDER BY created_at DESC LIMIT 1",
            params![agent_type, skill_name, parameters_hash, workflow_id],
            row_to_task,
        )
        .optional()
        .map_err(WatchError::from)
    }

    pub async fn find_by_idempotency_key(&self, key: &str) -> WatchResult<Option<Task>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM tasks WHERE idempotency_key = ?1 ORDER BY created_at DESC LIMIT 1",
            params![key],
            row_to_task,
        )
        .optional()
        .map_err(WatchError::from)
    }

    /// Atomically acquire the lease on a pending/retry-ready task. Returns
    /// `Ok(Some(task))` with the lease fields populated on success, `Ok(None)`
    /// if someone else already holds it or the row vanished.
    pub async fn acquire_lease(
        &self,
        task_id: &str,
        lock_token: &str,
        lease_duration_secs: i64,
    ) -> WatchResult<Option<Task>> {
        let now = Utc::now();
        let expires = now + chrono::Duration::seconds(lease_duration_secs);
        let conn = self.db.conn.lock().await;
        let updated = conn.execute(
            "UPDATE tasks SET lock_token = ?1, lock_expires_at = ?2, status = 'running',
                started_at = COALESCE(started_at, ?3), updated_at = ?3
             WHERE task_id = ?4
               AND (lock_token IS NULL OR lock_expires_at < ?3)
               AND status IN ('pending', 'running')",
            params![lock_token, expires, now, task_id],
        )
        .map_err(WatchError::from)?;

        if updated == 0 {
            return Ok(None);
        }
        conn.query_row("SELECT * FROM tasks WHERE task_id = ?1", params![task_id], row_to_task)
            .optional()
            .map_err(WatchError::from)
    }

    pub async fn release_lease(&self, task_id: &str, lock_token: &str) -> WatchResult<bool> {
        let conn = self.db.conn.lock().await;
        let updated = conn.execute(
            "UPDATE tasks SET lock_token = NULL, lock_expires_at = NULL, updated_at = ?1
             WHERE task_id = ?2 AND lock_token = ?3",
            params![Utc::now(), task_id, lock_token],
        )
        .map_err(WatchError::from)?;
        Ok(updated > 0)
    }

    /// Clear stale leases (`lock_expires_at` in the past) so the recovery
    /// daemon can pick the task back up. Returns the number of rows swept.
    pub async fn sweep_expired_leases(&self) -> WatchResult<u64> {
        let conn = self.db.conn.lock().await;
        let swept = conn.execute(
            "UPDATE tasks SET lock_token = NULL, lock_expires_at = NULL, updated_at = ?1
             WHERE lock_expires_at IS NOT NULL AND lock_expires_at < ?1",
            params![Utc::now()],
        )
        .map_err(WatchError::from)?;
        Ok(swept as u64)
    }

    pub async fn complete(&self, task_id: &str, result_data: serde_json::Value, result_hash: &str) -> WatchResult<()> {
        let now = Utc::now();
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE tasks SET status = 'completed', result_data = ?1, result_hash = ?2,
                completed_at = ?3, updated_at = ?3, lock_token = NULL, lock_expires_at = NULL
             WHERE task_id = ?4",
            params![
                serde_json::to_string(&result_data).unwrap_or_default(),
                result_hash,
                now,
                task_id
            ],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    /// Record a failure. If retries remain, schedules a retry with
    /// exponential backoff (`min(2^retry_count, 60)` minutes) and leaves the
    /// task `Pending`; otherwise marks it terminally `Failed`.
    pub async fn fail(&self, task_id: &str, error_message: &str) -> WatchResult<TaskStatus> {
        let now = Utc::now();
        let conn = self.db.conn.lock().await;
        let (retry_count, max_retries): (i32, i32) = conn
            .query_row(
                "SELECT retry_count, max_retries FROM tasks WHERE task_id = ?1",
                params![task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(WatchError::from)?;

        let next_retry_count = retry_count + 1;
        if next_retry_count < max_retries {
            let backoff_minutes = 2i64.pow(u32::try_from(next_retry_count).unwrap_or(0)).min(60);
            let next_retry_at = now + chrono::Duration::minutes(backoff_minutes);
            conn.execute(
                "UPDATE tasks SET status = 'pending', retry_count = ?1, next_retry_at = ?2,
                    error_message = ?3, updated_at = ?4, lock_token = NULL, lock_expires_at = NULL
                 WHERE task_id = ?5",
                params![next_retry_count, next_retry_at, error_message, now, task_id],
            )
            .map_err(WatchError::from)?;
            Ok(TaskStatus::Pending)
        } else {
            conn.execute(
                "UPDATE tasks SET status = 'failed', retry_count = ?1, error_message = ?2,
                    completed_at = ?3, updated_at = ?3, lock_token = NULL, lock_expires_at = NULL
                 WHERE task_id = ?4",
                params![next_retry_count, error_message, now, task_id],
            )
            .map_err(WatchError::from)?;
            Ok(TaskStatus::Failed)
        }
    }

    pub async fn list_due_for_retry(&self, now: DateTime<Utc>, limit: i64) -> WatchResult<Vec<Task>> {
        let conn = self.db.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM tasks WHERE status = 'pending' AND next_retry_at IS NOT NULL
                 AND next_retry_at <= ?1 ORDER BY priority ASC, next_retry_at ASC LIMIT ?2",
            )
            .map_err(WatchError::from)?;
        let rows = stmt
            .query_map(params![now, limit], row_to_task)
            .map_err(WatchError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(WatchError::from)
    }

    pub async fn list_by_workflow(&self, workflow_id: &str) -> WatchResult<Vec<Task>> {
        let conn = self.db.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM tasks WHERE workflow_id = ?1 ORDER BY created_at ASC")
            .map_err(WatchError::from)?;
        let rows = stmt.query_map(params![workflow_id], row_to_task).map_err(WatchError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(WatchError::from)
    }

    /// Candidates for the recovery daemon's scan: terminally `Failed`, stuck
    /// `Running` past an hour, or stuck `Pending` past 30 minutes, and not
    /// older than `max_age_secs` since creation.
    pub async fn list_stuck_or_failed(&self, now: DateTime<Utc>, max_age_secs: i64) -> WatchResult<Vec<Task>> {
        let oldest = now - chrono::Duration::seconds(max_age_secs);
        let running_cutoff = now - chrono::Duration::hours(1);
        let pending_cutoff = now - chrono::Duration::minutes(30);
        let conn = self.db.conn.lock().await;
        let mut stmt = conn
            .prepare(
                "SELECT * FROM tasks WHERE created_at >= ?1 AND (
                    status = 'failed'
                    OR (status = 'running' AND started_at IS NOT NULL AND started_at < ?2)
                    OR (status = 'pending' AND created_at < ?3)
                 ) ORDER BY created_at ASC",
            )
            .map_err(WatchError::from)?;
        let rows = stmt
            .query_map(params![oldest, running_cutoff, pending_cutoff], row_to_task)
            .map_err(WatchError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(WatchError::from)
    }

    /// Reset a task back to `Pending` for a retry-strategy recovery: clears
    /// lease/`started_at`/`completed_at`/`error_message`, increments
    /// `retry_count`, and schedules `next_retry_at` via the backoff formula.
    /// If `checkpoint` is given, it is merged into `parameters` with a
    /// `_checkpoint_recovery` marker (the checkpoint-strategy variant).
    pub async fn reset_for_retry(&self, task_id: &str, checkpoint: Option<&serde_json::Value>) -> WatchResult<()> {
        let now = Utc::now();
        let conn = self.db.conn.lock().await;
        let retry_count: i32 = conn
            .query_row("SELECT retry_count FROM tasks WHERE task_id = ?1", params![task_id], |row| row.get(0))
            .map_err(WatchError::from)?;
        let next_retry_count = retry_count + 1;
        let next_retry_at = now + chrono::Duration::minutes(crate::idempotency::backoff_minutes(
            u32::try_from(next_retry_count).unwrap_or(0),
        ));

        if let Some(checkpoint) = checkpoint {
            let parameters_str: String = conn
                .query_row("SELECT parameters FROM tasks WHERE task_id = ?1", params![task_id], |row| row.get(0))
                .map_err(WatchError::from)?;
            let mut parameters: serde_json::Value =
                serde_json::from_str(&parameters_str).unwrap_or(serde_json::Value::Object(Default::default()));
            if let (serde_json::Value::Object(map), serde_json::Value::Object(checkpoint_map)) = (&mut parameters, checkpoint) {
                for (k, v) in checkpoint_map {
                    map.insert(k.clone(), v.clone());
                }
                map.insert("_checkpoint_recovery".to_string(), serde_json::Value::Bool(true));
            }
            conn.execute(
                "UPDATE tasks SET status = 'pending', lock_token = NULL, lock_expires_at = NULL,
                    started_at = NULL, completed_at = NULL, error_message = NULL,
                    retry_count = ?1, next_retry_at = ?2, parameters = ?3, updated_at = ?4
                 WHERE task_id = ?5",
                params![next_retry_count, next_retry_at, serde_json::to_string(&parameters).unwrap_or_default(), now, task_id],
            )
            .map_err(WatchError::from)?;
        } else {
            conn.execute(
                "UPDATE tasks SET status = 'pending', lock_token = NULL, lock_expires_at = NULL,
                    started_at = NULL, completed_at = NULL, error_message = NULL,
                    retry_count = ?1, next_retry_at = ?2, updated_at = ?3
                 WHERE task_id = ?4",
                params![next_retry_count, next_retry_at, now, task_id],
            )
            .map_err(WatchError::from)?;
        }
        Ok(())
    }

    /// Terminally mark a task `Failed` with an explanatory message
    /// (rollback-strategy recovery; no further retries are scheduled).
    pub async fn rollback(&self, task_id: &str, message: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE tasks SET status = 'failed', lock_token = NULL, lock_expires_at = NULL,
                completed_at = ?1, error_message = ?2, updated_at = ?1 WHERE task_id = ?3",
            params![Utc::now(), message, task_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    /// Terminally cancel a task (skip-strategy recovery).
    pub async fn cancel(&self, task_id: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE tasks SET status = 'cancelled', lock_token = NULL, lock_expires_at = NULL,
                completed_at = ?1, updated_at = ?1 WHERE task_id = ?2",
            params![Utc::now(), task_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store() -> TaskStore {
        let db = Db::open(":memory:").await.unwrap();
        TaskStore::new(db)
    }

    fn sample_task() -> Task {
        Task::new(
            "retrieval-agent",
            "scan_subreddit",
            json!({"subreddit": "rust"}),
            "hash123".to_string(),
            Some("wf-1".to_string()),
            None,
            None,
            5,
        )
    }

    #[tokio::test]
    async fn insert_and_get_roundtrips() {
        let store = store().await;
        let task = sample_task();
        store.insert(&task).await.unwrap();
        let fetched = store.get(&task.task_id.to_string()).await.unwrap().unwrap();
        assert_eq!(fetched.agent_type, "retrieval-agent");
        assert_eq!(fetched.parameters_hash, "hash123");
    }

    #[tokio::test]
    async fn acquire_lease_blocks_concurrent_holder() {
        let store = store().await;
        let task = sample_task();
        store.insert(&task).await.unwrap();
        let id = task.task_id.to_string();

        let first = store.acquire_lease(&id, "token-a", 60).await.unwrap();
        assert!(first.is_some());

        let second = store.acquire_lease(&id, "token-b", 60).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn fail_schedules_retry_until_exhausted() {
        let store = store().await;
        let task = sample_task();
        store.insert(&task).await.unwrap();
        let id = task.task_id.to_string();

        let status = store.fail(&id, "boom").await.unwrap();
        assert_eq!(status, TaskStatus::Pending);
        let status = store.fail(&id, "boom again").await.unwrap();
        assert_eq!(status, TaskStatus::Pending);
        let status = store.fail(&id, "final boom").await.unwrap();
        assert_eq!(status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn find_active_by_key_ignores_failed_rows() {
        let store = store().await;
        let mut task = sample_task();
        task.status = TaskStatus::Failed;
        store.insert(&task).await.unwrap();

        let found = store
            .find_active_by_key("retrieval-agent", "scan_subreddit", "hash123", Some("wf-1"))
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
