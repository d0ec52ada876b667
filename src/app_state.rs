//! Shared state for one agent's HTTP server: config, stores, the breaker
//! registry, the service registry, and this process's skill table.

use std::sync::Arc;

use crate::agent_card::{AgentCard, SkillTable};
use crate::infrastructure::circuit_breaker::CircuitBreakerRegistry;
use crate::registry::SharedRegistry;
use crate::store::{AgentStore, AlertStore, DedupStore, RecoveryStore, TaskStore, WorkflowStore};
use crate::utils::auth::AuthManager;
use crate::utils::config::Config;
use crate::utils::rate_limiter::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub agent_type: String,
    pub card: AgentCard,
    pub skills: SkillTable,
    pub task_store: TaskStore,
    pub workflow_store: WorkflowStore,
    pub agent_store: AgentStore,
    pub recovery_store: RecoveryStore,
    pub dedup_store: DedupStore,
    pub alert_store: AlertStore,
    pub registry: SharedRegistry,
    pub breakers: Arc<CircuitBreakerRegistry>,
    pub auth: Arc<AuthManager>,
    pub rate_limiter: Arc<RateLimiter>,
    pub http_client: reqwest::Client,
}
