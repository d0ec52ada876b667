//! The `Task` entity: one skill invocation on one agent, persisted with
//! idempotency and lease metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states never get re-visited by the recovery daemon, except
    /// `Failed`, which is only terminal once retries are exhausted.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }

    /// Non-terminal for idempotency-dedup purposes: Pending/Running/Completed
    /// collide on the same `(agent_type, skill, hash, workflow_id)` key.
    /// Failed/Cancelled do not — a fresh attempt is always allowed.
    #[must_use]
    pub fn counts_for_dedup(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::Running | TaskStatus::Completed
        )
    }
}

/// Default priority (1 highest .. 10 lowest).
pub const DEFAULT_PRIORITY: i32 = 5;
/// Default retry ceiling.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub agent_type: String,
    pub skill_name: String,
    pub parameters: serde_json::Value,
    pub parameters_hash: String,
    pub workflow_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub correlation_id: Option<String>,
    pub priority: i32,
    pub status: TaskStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub lock_token: Option<String>,
    pub lock_expires_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result_data: Option<serde_json::Value>,
    pub result_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Construct a brand-new `Pending` task. Callers go through
    /// `idempotency::create_idempotent_task` rather than this directly, so
    /// the dedup invariant always holds.
    #[must_use]
    pub fn new(
        agent_type: impl Into<String>,
        skill_name: impl Into<String>,
        parameters: serde_json::Value,
        parameters_hash: String,
        workflow_id: Option<String>,
        idempotency_key: Option<String>,
        correlation_id: Option<String>,
        priority: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            task_id: Uuid::new_v4(),
            agent_type: agent_type.into(),
            skill_name: skill_name.into(),
            parameters,
            parameters_hash,
            workflow_id,
            idempotency_key,
            correlation_id,
            priority,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            lock_token: None,
            lock_expires_at: None,
            started_at: None,
            completed_at: None,
            error_message: None,
            result_data: None,
            result_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `lock_token` is set and hasn't passed `lock_expires_at`.
    #[must_use]
    pub fn has_active_lease(&self, now: DateTime<Utc>) -> bool {
        match (self.lock_token.as_ref(), self.lock_expires_at) {
            (Some(_), Some(expires)) => expires > now,
            _ => false,
        }
    }
}
