//! The `coordinator` agent: exposes a `run_monitoring_cycle` skill that
//! drives `coordinator::run_monitoring_cycle`, and a scheduling loop that
//! calls it on `monitoring_interval_hours`.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::agent_card::{AgentCard, AgentSkill, SkillTable};
use crate::app_state::AppState;
use crate::coordinator;
use crate::http_client::RemoteInvoker;
use crate::utils::error::WatchResult;

#[derive(Debug, Deserialize)]
struct RunCycleParams {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    subreddits: Vec<String>,
}

pub fn build(state: AppState, invoker: Arc<RemoteInvoker>, base_url: &str) -> (AgentCard, SkillTable) {
    let card = AgentCard::new(
        "coordinator-agent",
        "Drives the four-stage Reddit monitoring pipeline",
        base_url,
        vec![AgentSkill {
            id: "run_monitoring_cycle".to_string(),
            name: "run_monitoring_cycle".to_string(),
            description: "Run one Retrieve-Filter-Summarise-Alert monitoring cycle".to_string(),
            tags: vec!["coordinator".to_string(), "workflow".to_string()],
            input_modes: vec!["application/json".to_string()],
            output_modes: vec!["application/json".to_string()],
            examples: vec![],
        }],
    );

    let mut skills = SkillTable::new();
    skills.register(
        "run_monitoring_cycle",
        Arc::new(move |params| {
            let state = state.clone();
            let invoker = invoker.clone();
            Box::pin(run_cycle_skill(state, invoker, params))
        }),
    );

    (card, skills)
}

async fn run_cycle_skill(state: AppState, invoker: Arc<RemoteInvoker>, params: serde_json::Value) -> WatchResult<serde_json::Value> {
    let params: RunCycleParams = serde_json::from_value(params).unwrap_or(RunCycleParams {
        topics: vec![],
        subreddits: vec![],
    });

    let topics = if params.topics.is_empty() {
        state.config.workflow.reddit_topics.clone()
    } else {
        params.topics
    };
    let subreddits = if params.subreddits.is_empty() {
        state.config.workflow.reddit_subreddits.clone()
    } else {
        params.subreddits
    };

    let outcome = coordinator::run_monitoring_cycle(&state, &invoker, &topics, &subreddits).await?;
    Ok(json!({
        "workflow_id": outcome.workflow_id,
        "status": outcome.status.as_str(),
        "alerts_sent": outcome.alerts_sent,
    }))
}

/// Run `run_monitoring_cycle` every `monitoring_interval_hours` until `stop`
/// fires. Errors from a single cycle are logged, not propagated — the next
/// scheduled tick still runs.
pub async fn run_scheduler(state: AppState, invoker: Arc<RemoteInvoker>, interval_hours: u64, mut stop: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_hours.max(1) * 3600));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let topics = state.config.workflow.reddit_topics.clone();
                let subreddits = state.config.workflow.reddit_subreddits.clone();
                match coordinator::run_monitoring_cycle(&state, &invoker, &topics, &subreddits).await {
                    Ok(outcome) => info!(workflow_id = outcome.workflow_id, alerts_sent = outcome.alerts_sent, "scheduled monitoring cycle completed"),
                    Err(err) => warn!(error = %err, "scheduled monitoring cycle failed"),
                }
            }
            _ = stop.changed() => {
                if *stop.borrow() {
                    info!("coordinator scheduler stopping");
                    break;
                }
            }
        }
    }
}
