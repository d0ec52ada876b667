//! The `Workflow` entity: one run of the four-stage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WorkflowStatus::Pending),
            "running" => Some(WorkflowStatus::Running),
            "completed" => Some(WorkflowStatus::Completed),
            "failed" => Some(WorkflowStatus::Failed),
            "cancelled" => Some(WorkflowStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub workflow_id: String,
    pub workflow_type: String,
    pub status: WorkflowStatus,
    pub config: serde_json::Value,
    pub schedule: Option<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: i64,
    pub error_count: i64,
    pub posts_processed: i64,
    pub comments_processed: i64,
    pub relevant_items: i64,
    pub summaries_created: i64,
    pub alerts_sent: i64,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Workflow {
    #[must_use]
    pub fn new(workflow_id: impl Into<String>, workflow_type: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_type: workflow_type.into(),
            status: WorkflowStatus::Pending,
            config,
            schedule: None,
            last_run: None,
            next_run: None,
            run_count: 0,
            error_count: 0,
            posts_processed: 0,
            comments_processed: 0,
            relevant_items: 0,
            summaries_created: 0,
            alerts_sent: 0,
            error_message: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }
}
