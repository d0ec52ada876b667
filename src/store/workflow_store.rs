//! CRUD and counter updates for `Workflow` rows.

use rusqlite::{params, OptionalExtension, Row};

use crate::store::Db;
use crate::tasks::workflow::{Workflow, WorkflowStatus};
use crate::utils::error::{WatchError, WatchResult};

#[derive(Clone)]
pub struct WorkflowStore {
    db: Db,
}

fn row_to_workflow(row: &Row<'_>) -> rusqlite::Result<Workflow> {
    let status_str: String = row.get("status")?;
    let config_str: String = row.get("config")?;
    Ok(Workflow {
        workflow_id: row.get("workflow_id")?,
        workflow_type: row.get("workflow_type")?,
        status: WorkflowStatus::from_str(&status_str).unwrap_or(WorkflowStatus::Pending),
        config: serde_json::from_str(&config_str).unwrap_or(serde_json::Value::Null),
        schedule: row.get("schedule")?,
        last_run: row.get("last_run")?,
        next_run: row.get("next_run")?,
        run_count: row.get("run_count")?,
        error_count: row.get("error_count")?,
        posts_processed: row.get("posts_processed")?,
        comments_processed: row.get("comments_processed")?,
        relevant_items: row.get("relevant_items")?,
        summaries_created: row.get("summaries_created")?,
        alerts_sent: row.get("alerts_sent")?,
        error_message: row.get("error_message")?,
        started_at: row.get("started_at")?,
        completed_at: row.get("completed_at")?,
    })
}

impl WorkflowStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub async fn insert(&self, wf: &Workflow) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "INSERT INTO workflows (
                workflow_id, workflow_type, status, config, schedule, last_run, next_run,
                run_count, error_count, posts_processed, comments_processed, relevant_items,
                summaries_created, alerts_sent, error_message, started_at, completed_at
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)",
            params![
                wf.workflow_id,
                wf.workflow_type,
                wf.status.as_str(),
                serde_json::to_string(&wf.config).unwrap_or_default(),
                wf.schedule,
                wf.last_run,
                wf.next_run,
                wf.run_count,
                wf.error_count,
                wf.posts_processed,
                wf.comments_processed,
                wf.relevant_items,
                wf.summaries_created,
                wf.alerts_sent,
                wf.error_message,
                wf.started_at,
                wf.completed_at,
            ],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn get(&self, workflow_id: &str) -> WatchResult<Option<Workflow>> {
        let conn = self.db.conn.lock().await;
        conn.query_row(
            "SELECT * FROM workflows WHERE workflow_id = ?1",
            params![workflow_id],
            row_to_workflow,
        )
        .optional()
        .map_err(WatchError::from)
    }

    pub async fn set_status(&self, workflow_id: &str, status: WorkflowStatus) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE workflows SET status = ?1 WHERE workflow_id = ?2",
            params![status.as_str(), workflow_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    /// Add to the running totals as each pipeline stage reports progress.
    pub async fn add_counters(
        &self,
        workflow_id: &str,
        posts: i64,
        comments: i64,
        relevant: i64,
        summaries: i64,
        alerts: i64,
    ) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE workflows SET posts_processed = posts_processed + ?1,
                comments_processed = comments_processed + ?2,
                relevant_items = relevant_items + ?3,
                summaries_created = summaries_created + ?4,
                alerts_sent = alerts_sent + ?5
             WHERE workflow_id = ?6",
            params![posts, comments, relevant, summaries, alerts, workflow_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn complete(&self, workflow_id: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE workflows SET status = 'completed', completed_at = ?1, run_count = run_count + 1,
                last_run = ?1 WHERE workflow_id = ?2",
            params![chrono::Utc::now(), workflow_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }

    pub async fn fail(&self, workflow_id: &str, error_message: &str) -> WatchResult<()> {
        let conn = self.db.conn.lock().await;
        conn.execute(
            "UPDATE workflows SET status = 'failed', completed_at = ?1, error_count = error_count + 1,
                error_message = ?2, last_run = ?1 WHERE workflow_id = ?3",
            params![chrono::Utc::now(), error_message, workflow_id],
        )
        .map_err(WatchError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_get_and_counters() {
        let db = Db::open(":memory:").await.unwrap();
        let store = WorkflowStore::new(db);
        let wf = Workflow::new("wf-1", "monitoring_cycle", serde_json::json!({}));
        store.insert(&wf).await.unwrap();

        store.add_counters("wf-1", 10, 5, 3, 2, 1).await.unwrap();
        let fetched = store.get("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched.posts_processed, 10);
        assert_eq!(fetched.alerts_sent, 1);

        store.complete("wf-1").await.unwrap();
        let fetched = store.get("wf-1").await.unwrap().unwrap();
        assert_eq!(fetched.status, WorkflowStatus::Completed);
        assert_eq!(fetched.run_count, 1);
    }
}
