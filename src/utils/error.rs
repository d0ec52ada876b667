//! Structured error type for the watch hive, covering the failure kinds the
//! coordinator, agent runtime, and recovery daemon need to classify and
//! propagate distinctly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The crate-wide error type.
///
/// Variants map onto the failure kinds a caller needs to react to
/// differently: whether a call is retriable, whether it should surface to an
/// HTTP client as 4xx/5xx, and whether the recovery daemon should ever see
/// it at all (duplicate/lease-contention are handled locally and never
/// escape C2).
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum WatchError {
    #[error("transport error calling {agent_type}/{skill}: {reason}")]
    Transport {
        agent_type: String,
        skill: String,
        reason: String,
    },

    #[error("upstream error from {agent_type}/{skill}: {reason}")]
    Upstream {
        agent_type: String,
        skill: String,
        reason: String,
    },

    #[error("permanent upstream error from {agent_type}/{skill}: {reason}")]
    UpstreamPermanent {
        agent_type: String,
        skill: String,
        reason: String,
    },

    #[error("request validation failed: {reason}")]
    Validation { reason: String },

    #[error("authentication failed: {reason}")]
    Auth { reason: String },

    #[error("duplicate row for key {key}")]
    Duplicate { key: String },

    #[error("lease already held for task {task_id}")]
    LeaseContention { task_id: String },

    #[error("circuit breaker open for {breaker_key}")]
    CircuitOpen { breaker_key: String },

    #[error("task {task_id} not found")]
    TaskNotFound { task_id: String },

    #[error("workflow {workflow_id} not found")]
    WorkflowNotFound { workflow_id: String },

    #[error("database error during {operation}: {reason}")]
    Database { operation: String, reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("operation timed out after {timeout_secs}s: {operation}")]
    Timeout { operation: String, timeout_secs: u64 },
}

impl WatchError {
    /// Whether a caller should retry this failure (per the error kind table).
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            WatchError::Transport { .. } | WatchError::Upstream { .. } | WatchError::CircuitOpen { .. }
        )
    }

    /// Map this error onto an HTTP status code for the agent runtime.
    #[must_use]
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            WatchError::Auth { .. } => StatusCode::UNAUTHORIZED,
            WatchError::Validation { .. } => StatusCode::BAD_REQUEST,
            WatchError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            WatchError::TaskNotFound { .. } | WatchError::WorkflowNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            WatchError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            WatchError::Duplicate { .. } | WatchError::LeaseContention { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for WatchError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref sqlite_err, _) = e {
            if sqlite_err.code == rusqlite::ErrorCode::ConstraintViolation {
                return WatchError::Duplicate {
                    key: e.to_string(),
                };
            }
        }
        WatchError::Database {
            operation: "sqlite".to_string(),
            reason: e.to_string(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type WatchResult<T> = Result<T, WatchError>;
