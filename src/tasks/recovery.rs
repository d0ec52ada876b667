//! The `TaskRecovery` entity: tracks a recovery attempt for a failed task,
//! driven by the recovery daemon (component C6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStrategy {
    Retry,
    Rollback,
    Skip,
    Checkpoint,
    Manual,
}

impl RecoveryStrategy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStrategy::Retry => "retry",
            RecoveryStrategy::Rollback => "rollback",
            RecoveryStrategy::Skip => "skip",
            RecoveryStrategy::Checkpoint => "checkpoint",
            RecoveryStrategy::Manual => "manual",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "retry" => Some(RecoveryStrategy::Retry),
            "rollback" => Some(RecoveryStrategy::Rollback),
            "skip" => Some(RecoveryStrategy::Skip),
            "checkpoint" => Some(RecoveryStrategy::Checkpoint),
            "manual" => Some(RecoveryStrategy::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryStatus {
    Pending,
    Recovering,
    Completed,
    Failed,
}

impl RecoveryStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Pending => "pending",
            RecoveryStatus::Recovering => "recovering",
            RecoveryStatus::Completed => "completed",
            RecoveryStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RecoveryStatus::Pending),
            "recovering" => Some(RecoveryStatus::Recovering),
            "completed" => Some(RecoveryStatus::Completed),
            "failed" => Some(RecoveryStatus::Failed),
            _ => None,
        }
    }
}

pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecovery {
    pub task_id: String,
    pub original_task_id: String,
    pub recovery_strategy: RecoveryStrategy,
    pub recovery_status: RecoveryStatus,
    pub recovery_attempt: i32,
    pub max_recovery_attempts: i32,
    pub checkpoint_data: Option<serde_json::Value>,
    pub failure_reason: Option<String>,
    pub recovery_started_at: Option<DateTime<Utc>>,
    pub recovery_completed_at: Option<DateTime<Utc>>,
    pub recovery_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecovery {
    #[must_use]
    pub fn new(
        original_task_id: impl Into<String>,
        recovery_strategy: RecoveryStrategy,
        failure_reason: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let original_task_id = original_task_id.into();
        Self {
            task_id: uuid::Uuid::new_v4().to_string(),
            original_task_id,
            recovery_strategy,
            recovery_status: RecoveryStatus::Pending,
            recovery_attempt: 0,
            max_recovery_attempts: DEFAULT_MAX_RECOVERY_ATTEMPTS,
            checkpoint_data: None,
            failure_reason,
            recovery_started_at: None,
            recovery_completed_at: None,
            recovery_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn attempts_exhausted(&self) -> bool {
        self.recovery_attempt >= self.max_recovery_attempts
    }
}
