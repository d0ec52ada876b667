//! CRUD and heartbeat updates for `AgentState` rows.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::store::Db;
use crate::tasks::agent_state::{AgentState, AgentStatus};
use crate::utils::error::{WatchError, WatchResult};

#[derive(Clone)]
pub struct AgentStore {
    db: Db,
}

fn row_to_agent_state(row: &Row<'_>) -> rusqlite::Result<AgentState> {
    let status_str: String = row.get("status")?;
    let state_data_str: String = row.get("state_data")?;
    let capabilities_str: String = row.get("capabilities")?;
    Ok(AgentState {
        agent_id: row.get("agent_id")?,
        agent_type: row.get("agent_type")?,
        status: AgentStatus::from_str(&status_str).unwrap_or(AgentStatus::Offline),
        state_data: serde_json::from_str(&state_data_str).unwrap_or(serde_json::Value::Null),
        capabilities: serde_json::from_str(&capabilities_str).unwrap_or_default(),
        current_task_id: row.get("current_task_id")?,
        heartbeat_at: row.get("heartbeat_at")?,
        error_count: row.get("error_count")?,
        last_error: row.get("last_error")?,
        tasks_completed: row.get("tasks_completed")?,
        tasks_failed: row.get("tasks_failed")?,
        avg_execution_time_ms: row.get("avg_execution_time_ms")?,
        created_at: row.get("created_at")?,
        last_updated: row.get("last_updated")?,
    })
}

impl AgentStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Insert the row if new, otherwise refresh heartbeat/status/capabilities
    /// in place. Agents self-register this way on every heartbeat.
    pub async fn upsert(&self, state: &AgentState) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "INSERT INTO agent_states (
                agent_id, agent_type, status, state_data, capabilities, current_task_id,
                heartbeat_at, error_count, last_error, tasks_completed, tasks_failed,
                avg_execution_time_ms, created_at, last_updated
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)
            ON CONFLICT(agent_id) DO UPDATE SET
                status = excluded.status,
                state_data = excluded.state_data,
                capabilities = excluded.capabilities,
                current_task_id = excluded.current_task_id,
                heartbeat_at = excluded.heartbeat_at,
                error_count = excluded.error_count,
                last_error = excluded.last_error,
                tasks_completed = excluded.tasks_completed,
                tasks_failed = excluded.tasks_failed,
                avg_execution_time_ms = excluded.avg_execution_time_ms,
                last_updated = excluded.last_updated",
            params![
                state.agent_id,
                state.agent_type,
                state.status.as_str(),
                serde_json::to_string(&state.state_data).unwrap_or_default(),
                serde_json::to_string(&state.capabilities).unwrap_or_default(),
                state.current_task_id,
                state.heartbeat_at,
                state.error_count,
                state.last_error,
                state.tasks_completed,
                state.tasks_failed,
                state.avg_execution_time_ms,
                state.created_at,
                state.last_updated,
            ],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn get(&self, agent_id: &str) -> WatchResult<Option<AgentState>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM agent_states WHERE agent_id = ?1",
            params![agent_id],
            row_to_agent_state,
        )
        .optional()
        .map_err(WatchError::from)
    }

    pub async fn list_by_type(&self, agent_type: &str) -> WatchResult<Vec<AgentState>> {
        let conn = self.db.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT * FROM agent_states WHERE agent_type = ?1 ORDER BY agent_id ASC")
            .map_err(WatchError::from)?;
        let rows = stmt.query_map(params![agent_type], row_to_agent_state).map_err(WatchError::from)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(WatchError::from)
    }

    /// Mark agents whose last heartbeat is older than `now - stale_after_secs`
    /// as offline. Called periodically by the recovery daemon.
    pub async fn mark_stale_offline(&self, now: DateTime<Utc>, stale_after_secs: i64) -> WatchResult<u64> {
        let cutoff = now - chrono::Duration::seconds(stale_after_secs);
        let conn = self.db.conn.lock().await;
        let updated = conn.execute(
            "UPDATE agent_states SET status = 'offline', last_updated = ?1
             WHERE heartbeat_at < ?2 AND status != 'offline'",
            params![now, cutoff],
        )
        .map_err(WatchError::from)?;
        Ok(updated as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_refresh() {
        let db = Db::open(":memory:").await.unwrap();
        let store = AgentStore::new(db);
        let mut state = AgentState::new("agent-1", "retrieval-agent", vec!["scan_subreddit".to_string()]);
        store.upsert(&state).await.unwrap();

        state.status = AgentStatus::Busy;
        state.tasks_completed = 1;
        store.upsert(&state).await.unwrap();

        let fetched = store.get("agent-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, AgentStatus::Busy);
        assert_eq!(fetched.tasks_completed, 1);
    }

    #[tokio::test]
    async fn mark_stale_offline_flips_old_heartbeats() {
        let db = Db::open(":memory:").await.unwrap();
        let store = AgentStore::new(db);
        let mut state = AgentState::new("agent-1", "retrieval-agent", vec![]);
        state.heartbeat_at = Utc::now() - chrono::Duration::seconds(600);
        store.upsert(&state).await.unwrap();

        let updated = store.mark_stale_offline(Utc::now(), 120).await.unwrap();
        assert_eq!(updated, 1);
        let fetched = store.get("agent-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, AgentStatus::Offline);
    }
}
