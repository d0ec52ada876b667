//! Embedded SQLite persistence (component C1). One `Db` handle is shared
//! behind an `Arc<Mutex<Connection>>`; each entity family gets its own
//! thin store wrapping it. Schema is created idempotently on open so
//! `migrate`/`serve`/tests can all just call `Db::open`.

pub mod agent_store;
pub mod alert_store;
pub mod dedup_store;
pub mod recovery_store;
pub mod task_store;
pub mod workflow_store;

pub use agent_store::AgentStore;
pub use alert_store::AlertStore;
pub use dedup_store::DedupStore;
pub use recovery_store::RecoveryStore;
pub use task_store::TaskStore;
pub use workflow_store::WorkflowStore;

use crate::utils::error::WatchResult;
use rusqlite::Connection;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

#[derive(Clone)]
pub struct Db {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Open (or create) the database at `database_url` and run schema
    /// migrations. Accepts both `sqlite://path` URLs and bare file paths,
    /// plus the literal `:memory:` for tests.
    pub async fn open(database_url: &str) -> WatchResult<Self> {
        let path = database_url
            .strip_prefix("sqlite://")
            .unwrap_or(database_url);

        if path != ":memory:" {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| crate::utils::error::WatchError::Database {
                            operation: "create_dir_all".to_string(),
                            reason: e.to_string(),
                        })?;
                }
            }
        }

        let conn = Connection::open(path).map_err(|e| crate::utils::error::WatchError::Database {
            operation: "open".to_string(),
            reason: e.to_string(),
        })?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate().await?;
        info!(database_url, "database opened and migrated");
        Ok(db)
    }

    async fn migrate(&self) -> WatchResult<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(|e| crate::utils::error::WatchError::Database {
            operation: "migrate".to_string(),
            reason: e.to_string(),
        })?;
        conn.execute_batch(SCHEMA).map_err(|e| crate::utils::error::WatchError::Database {
            operation: "migrate".to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    task_id TEXT PRIMARY KEY,
    agent_type TEXT NOT NULL,
    skill_name TEXT NOT NULL,
    parameters TEXT NOT NULL,
    parameters_hash TEXT NOT NULL,
    workflow_id TEXT,
    idempotency_key TEXT,
    correlation_id TEXT,
    priority INTEGER NOT NULL,
    status TEXT NOT NULL,
    retry_count INTEGER NOT NULL,
    max_retries INTEGER NOT NULL,
    next_retry_at TEXT,
    lock_token TEXT,
    lock_expires_at TEXT,
    started_at TEXT,
    completed_at TEXT,
    error_message TEXT,
    result_data TEXT,
    result_hash TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_status_created ON tasks(status, created_at);
CREATE INDEX IF NOT EXISTS idx_tasks_workflow_status ON tasks(workflow_id, status);
CREATE INDEX IF NOT EXISTS idx_tasks_agent_status_priority ON tasks(agent_type, status, priority);
CREATE INDEX IF NOT EXISTS idx_tasks_next_retry ON tasks(next_retry_at);
CREATE INDEX IF NOT EXISTS idx_tasks_lock_expires ON tasks(lock_expires_at);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_dedup_key
    ON tasks(agent_type, skill_name, parameters_hash, workflow_id)
    WHERE status IN ('pending', 'running', 'completed');

CREATE TABLE IF NOT EXISTS workflows (
    workflow_id TEXT PRIMARY KEY,
    workflow_type TEXT NOT NULL,
    status TEXT NOT NULL,
    config TEXT NOT NULL,
    schedule TEXT,
    last_run TEXT,
    next_run TEXT,
    run_count INTEGER NOT NULL,
    error_count INTEGER NOT NULL,
    posts_processed INTEGER NOT NULL,
    comments_processed INTEGER NOT NULL,
    relevant_items INTEGER NOT NULL,
    summaries_created INTEGER NOT NULL,
    alerts_sent INTEGER NOT NULL,
    error_message TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status);

CREATE TABLE IF NOT EXISTS agent_states (
    agent_id TEXT PRIMARY KEY,
    agent_type TEXT NOT NULL,
    status TEXT NOT NULL,
    state_data TEXT NOT NULL,
    capabilities TEXT NOT NULL,
    current_task_id TEXT,
    heartbeat_at TEXT NOT NULL,
    error_count INTEGER NOT NULL,
    last_error TEXT,
    tasks_completed INTEGER NOT NULL,
    tasks_failed INTEGER NOT NULL,
    avg_execution_time_ms REAL,
    created_at TEXT NOT NULL,
    last_updated TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_agent_states_status_updated ON agent_states(status, last_updated);
CREATE INDEX IF NOT EXISTS idx_agent_states_type_status_heartbeat ON agent_states(agent_type, status, heartbeat_at);

CREATE TABLE IF NOT EXISTS task_recoveries (
    task_id TEXT PRIMARY KEY,
    original_task_id TEXT NOT NULL,
    recovery_strategy TEXT NOT NULL,
    recovery_status TEXT NOT NULL,
    recovery_attempt INTEGER NOT NULL,
    max_recovery_attempts INTEGER NOT NULL,
    checkpoint_data TEXT,
    failure_reason TEXT,
    recovery_started_at TEXT,
    recovery_completed_at TEXT,
    recovery_error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_recoveries_original_task ON task_recoveries(original_task_id);
CREATE INDEX IF NOT EXISTS idx_recoveries_status ON task_recoveries(recovery_status);

CREATE TABLE IF NOT EXISTS content_dedup (
    content_hash TEXT PRIMARY KEY,
    content_type TEXT NOT NULL,
    external_id TEXT NOT NULL,
    processing_status TEXT NOT NULL,
    first_seen_at TEXT NOT NULL,
    processed_at TEXT,
    source_agent TEXT,
    workflow_id TEXT,
    metadata TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_dedup_status ON content_dedup(processing_status);
CREATE INDEX IF NOT EXISTS idx_dedup_type_external ON content_dedup(content_type, external_id);

CREATE TABLE IF NOT EXISTS alert_batches (
    batch_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    summary TEXT NOT NULL,
    total_items INTEGER NOT NULL,
    priority TEXT NOT NULL,
    channels TEXT NOT NULL,
    schedule_type TEXT NOT NULL,
    status TEXT NOT NULL,
    sent_at TEXT,
    delivery_attempts INTEGER NOT NULL,
    last_error TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_batches_status_priority_created
    ON alert_batches(status, priority, created_at);

CREATE TABLE IF NOT EXISTS alert_deliveries (
    delivery_id TEXT PRIMARY KEY,
    alert_batch_id TEXT NOT NULL REFERENCES alert_batches(batch_id) ON DELETE CASCADE,
    channel TEXT NOT NULL,
    status TEXT NOT NULL,
    recipient TEXT,
    webhook_url TEXT,
    message_id TEXT,
    sent_at TEXT,
    delivery_time_ms INTEGER,
    error_message TEXT,
    retry_count INTEGER NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_deliveries_batch ON alert_deliveries(alert_batch_id);
";

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_in_memory_and_migrates() {
        let db = Db::open(":memory:").await.unwrap();
        let conn = db.conn.lock().await;
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert!(count >= 6);
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let db = Db::open(":memory:").await.unwrap();
        db.migrate().await.unwrap();
    }
}
