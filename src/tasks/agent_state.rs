//! The `AgentState` entity: heartbeat and workload bookkeeping for one agent
//! process in the mesh.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Busy,
    Error,
    Offline,
}

impl AgentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Busy => "busy",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(AgentStatus::Idle),
            "busy" => Some(AgentStatus::Busy),
            "error" => Some(AgentStatus::Error),
            "offline" => Some(AgentStatus::Offline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub agent_id: String,
    pub agent_type: String,
    pub status: AgentStatus,
    pub state_data: serde_json::Value,
    pub capabilities: Vec<String>,
    pub current_task_id: Option<String>,
    pub heartbeat_at: DateTime<Utc>,
    pub error_count: i64,
    pub last_error: Option<String>,
    pub tasks_completed: i64,
    pub tasks_failed: i64,
    pub avg_execution_time_ms: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl AgentState {
    #[must_use]
    pub fn new(agent_id: impl Into<String>, agent_type: impl Into<String>, capabilities: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            agent_type: agent_type.into(),
            status: AgentStatus::Idle,
            state_data: serde_json::json!({}),
            capabilities,
            current_task_id: None,
            heartbeat_at: now,
            error_count: 0,
            last_error: None,
            tasks_completed: 0,
            tasks_failed: 0,
            avg_execution_time_ms: None,
            created_at: now,
            last_updated: now,
        }
    }

    /// Agents with no heartbeat in the configured window are considered
    /// offline even if their last reported status was `Idle`/`Busy`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>, stale_after_secs: i64) -> bool {
        (now - self.heartbeat_at).num_seconds() > stale_after_secs
    }
}
