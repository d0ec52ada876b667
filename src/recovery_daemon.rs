//! Background recovery loop (component C6): sweeps expired leases, scans for
//! stuck/failed tasks, determines a recovery strategy for each, executes it,
//! and periodically cleans up old recovery records.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::tasks::recovery::{RecoveryStatus, RecoveryStrategy, TaskRecovery};
use crate::tasks::task::{Task, TaskStatus};
use crate::utils::error::WatchResult;

pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 300;
const FAILED_TASK_MAX_AGE_SECS: i64 = 24 * 3600;
const COMPLETED_RECOVERY_MAX_AGE_SECS: i64 = 7 * 24 * 3600;

pub struct RecoveryDaemon {
    state: AppState,
    check_interval: Duration,
}

impl RecoveryDaemon {
    #[must_use]
    pub fn new(state: AppState, check_interval: Duration) -> Self {
        Self { state, check_interval }
    }

    /// Run the daemon loop until `stop` fires. Each tick runs the five
    /// steps in order and logs a summary; a tick error is logged and the
    /// loop continues rather than exiting.
    pub async fn run(self, mut stop: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.check_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "recovery daemon tick failed");
                    }
                }
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("recovery daemon stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(&self) -> WatchResult<()> {
        let swept = self.state.task_store.sweep_expired_leases().await?;
        if swept > 0 {
            info!(swept, "recovery daemon swept expired leases");
        }

        let now = Utc::now();
        let candidates = self.state.task_store.list_stuck_or_failed(now, FAILED_TASK_MAX_AGE_SECS).await?;
        info!(count = candidates.len(), "recovery daemon scanned stuck/failed tasks");

        for task in candidates {
            if let Err(err) = self.recover_one(&task, now).await {
                warn!(task_id = %task.task_id, error = %err, "failed to recover task");
            }
        }

        let cleaned = self
            .state
            .recovery_store
            .delete_completed_older_than(now, COMPLETED_RECOVERY_MAX_AGE_SECS)
            .await?;
        if cleaned > 0 {
            info!(cleaned, "recovery daemon cleaned up old recovery records");
        }

        Ok(())
    }

    async fn recover_one(&self, task: &Task, now: chrono::DateTime<Utc>) -> WatchResult<()> {
        let task_id = task.task_id.to_string();
        let existing = self.state.recovery_store.get_by_original_task(&task_id).await?;

        let recovery = match existing {
            Some(r) if r.recovery_status == RecoveryStatus::Pending || r.recovery_status == RecoveryStatus::Recovering => r,
            Some(r) if r.attempts_exhausted() => {
                return Ok(());
            }
            _ => {
                let strategy = determine_strategy(task, now);
                let recovery = TaskRecovery::new(task_id.clone(), strategy, task.error_message.clone());
                self.state.recovery_store.insert(&recovery).await?;
                recovery
            }
        };

        self.execute_strategy(task, &recovery).await
    }

    async fn execute_strategy(&self, task: &Task, recovery: &TaskRecovery) -> WatchResult<()> {
        if recovery.attempts_exhausted() {
            return Ok(());
        }

        let task_id = task.task_id.to_string();
        match recovery.recovery_strategy {
            RecoveryStrategy::Retry => {
                self.state.task_store.reset_for_retry(&task_id, None).await?;
                self.state
                    .recovery_store
                    .update_status(&recovery.task_id, RecoveryStatus::Completed, None)
                    .await?;
            }
            RecoveryStrategy::Checkpoint => {
                let checkpoint = recovery.checkpoint_data.clone().or_else(|| task.result_data.clone());
                self.state.task_store.reset_for_retry(&task_id, checkpoint.as_ref()).await?;
                self.state
                    .recovery_store
                    .update_status(&recovery.task_id, RecoveryStatus::Completed, None)
                    .await?;
            }
            RecoveryStrategy::Rollback => {
                let message = recovery
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "rolled back after exhausting retries".to_string());
                self.state.task_store.rollback(&task_id, &message).await?;
                self.state
                    .recovery_store
                    .update_status(&recovery.task_id, RecoveryStatus::Completed, None)
                    .await?;
            }
            RecoveryStrategy::Skip => {
                self.state.task_store.cancel(&task_id).await?;
                self.state
                    .recovery_store
                    .update_status(&recovery.task_id, RecoveryStatus::Completed, None)
                    .await?;
            }
            RecoveryStrategy::Manual => {
                self.state
                    .recovery_store
                    .update_status(&recovery.task_id, RecoveryStatus::Pending, Some("awaiting manual intervention"))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Classify a stuck/failed task into a recovery strategy:
/// - retries exhausted and terminally `Failed` → rollback
/// - `Running` past two hours → retry
/// - `Running` under two hours → manual (still might finish)
/// - `Pending` (stuck past 30 minutes already, by the scan filter) → retry
fn determine_strategy(task: &Task, now: chrono::DateTime<Utc>) -> RecoveryStrategy {
    if task.status == TaskStatus::Failed && task.retry_count >= task.max_retries {
        return RecoveryStrategy::Rollback;
    }

    if task.status == TaskStatus::Running {
        let running_for = task
            .started_at
            .map(|started| now - started)
            .unwrap_or_default();
        return if running_for > chrono::Duration::hours(2) {
            RecoveryStrategy::Retry
        } else {
            RecoveryStrategy::Manual
        };
    }

    RecoveryStrategy::Retry
}

pub fn recovery_daemon_handle(state: AppState, check_interval_secs: u64) -> (Arc<tokio::task::JoinHandle<()>>, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let daemon = RecoveryDaemon::new(state, Duration::from_secs(check_interval_secs));
    let handle = tokio::spawn(async move {
        daemon.run(rx).await;
    });
    (Arc::new(handle), tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_task() -> Task {
        Task::new(
            "retrieval-agent",
            "scan_subreddit",
            json!({}),
            "hash".to_string(),
            None,
            None,
            None,
            3,
        )
    }

    #[test]
    fn exhausted_failed_task_rolls_back() {
        let mut task = base_task();
        task.status = TaskStatus::Failed;
        task.retry_count = 3;
        task.max_retries = 3;
        assert_eq!(determine_strategy(&task, Utc::now()), RecoveryStrategy::Rollback);
    }

    #[test]
    fn long_running_task_retries() {
        let mut task = base_task();
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now() - chrono::Duration::hours(3));
        assert_eq!(determine_strategy(&task, Utc::now()), RecoveryStrategy::Retry);
    }

    #[test]
    fn recently_running_task_needs_manual_review() {
        let mut task = base_task();
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now() - chrono::Duration::minutes(30));
        assert_eq!(determine_strategy(&task, Utc::now()), RecoveryStrategy::Manual);
    }

    #[test]
    fn stuck_pending_task_retries() {
        let mut task = base_task();
        task.status = TaskStatus::Pending;
        assert_eq!(determine_strategy(&task, Utc::now()), RecoveryStrategy::Retry);
    }
}
