//! Four-stage monitoring cycle pipeline (component C5): Retrieve → Filter →
//! Summarise → Alert, run strictly sequentially with each stage's result
//! persisted before the next begins.

use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::http_client::RemoteInvoker;
use crate::idempotency::create_idempotent_task;
use crate::tasks::task::TaskStatus;
use crate::tasks::workflow::{Workflow, WorkflowStatus};
use crate::utils::error::{WatchError, WatchResult};

const STAGE_TIMEOUT_RETRIEVE_SECS: u64 = 60;
const STAGE_TIMEOUT_FILTER_SECS: u64 = 60;
const STAGE_TIMEOUT_SUMMARISE_SECS: u64 = 120;
const STAGE_TIMEOUT_ALERT_SECS: u64 = 30;

pub struct CycleOutcome {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub alerts_sent: i64,
}

/// Run one monitoring cycle over every `(topic, subreddit)` pair.
pub async fn run_monitoring_cycle(
    state: &AppState,
    invoker: &RemoteInvoker,
    topics: &[String],
    subreddits: &[String],
) -> WatchResult<CycleOutcome> {
    let workflow_id = Uuid::new_v4().to_string();
    let workflow = Workflow::new(&workflow_id, "monitoring_cycle", json!({"topics": topics, "subreddits": subreddits}));
    state.workflow_store.insert(&workflow).await?;
    state.workflow_store.set_status(&workflow_id, WorkflowStatus::Running).await?;

    info!(workflow_id, "monitoring cycle started");

    match run_stages(state, invoker, &workflow_id, topics, subreddits).await {
        Ok(alerts_sent) => {
            state.workflow_store.complete(&workflow_id).await?;
            Ok(CycleOutcome {
                workflow_id,
                status: WorkflowStatus::Completed,
                alerts_sent,
            })
        }
        Err(err) => {
            error!(workflow_id, error = %err, "monitoring cycle failed");
            state.workflow_store.fail(&workflow_id, &err.to_string()).await?;
            Ok(CycleOutcome {
                workflow_id,
                status: WorkflowStatus::Failed,
                alerts_sent: 0,
            })
        }
    }
}

async fn run_stages(
    state: &AppState,
    invoker: &RemoteInvoker,
    workflow_id: &str,
    topics: &[String],
    subreddits: &[String],
) -> WatchResult<i64> {
    let retrieve_result = run_stage(
        state,
        invoker,
        workflow_id,
        "retrieval",
        "fetch_posts_by_topic",
        json!({"topics": topics, "subreddits": subreddits}),
        STAGE_TIMEOUT_RETRIEVE_SECS,
    )
    .await?;

    let total_posts = retrieve_result.get("total_posts").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let posts = retrieve_result.get("posts").cloned().unwrap_or(json!([]));
    state.workflow_store.add_counters(workflow_id, total_posts, 0, 0, 0, 0).await?;

    if total_posts == 0 {
        info!(workflow_id, "no posts retrieved, completing cycle");
        return Ok(0);
    }

    let filter_result = run_stage(
        state,
        invoker,
        workflow_id,
        "filter",
        "batch_filter_posts",
        json!({"posts": posts, "topics": topics}),
        STAGE_TIMEOUT_FILTER_SECS,
    )
    .await?;

    let relevant = filter_result.get("relevant").and_then(serde_json::Value::as_i64).unwrap_or(0);
    let relevant_posts = filter_result.get("relevant_posts").cloned().unwrap_or(json!([]));
    state.workflow_store.add_counters(workflow_id, 0, 0, relevant, 0, 0).await?;

    if relevant == 0 {
        info!(workflow_id, "no relevant items after filtering, completing cycle");
        return Ok(0);
    }

    let summarise_result = run_stage(
        state,
        invoker,
        workflow_id,
        "summarise",
        "summarizeContent",
        json!({"relevant_posts": relevant_posts}),
        STAGE_TIMEOUT_SUMMARISE_SECS,
    )
    .await?;

    state.workflow_store.add_counters(workflow_id, 0, 0, 0, 1, 0).await?;

    let summary_text = summarise_result
        .get("summary_text")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("")
        .to_string();

    let items: Vec<serde_json::Value> = relevant_posts
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|post| {
            json!({
                "title": post.get("title").cloned().unwrap_or(json!("untitled")),
                "message": post.get("body").cloned().unwrap_or(json!("")),
                "priority": "medium",
                "source": post.get("subreddit").cloned(),
                "url": post.get("url").cloned(),
            })
        })
        .collect();

    let alert_result = run_stage(
        state,
        invoker,
        workflow_id,
        "alert",
        "sendBatch",
        json!({
            "batch_id": Uuid::new_v4().to_string(),
            "title": format!("{relevant} relevant items found"),
            "summary": summary_text,
            "items": items,
            "channels": ["slack", "email"],
            "schedule_type": "immediate",
            "priority": "medium",
        }),
        STAGE_TIMEOUT_ALERT_SECS,
    )
    .await?;

    let successful = alert_result
        .get("successful_deliveries")
        .and_then(serde_json::Value::as_i64)
        .unwrap_or(0);
    state.workflow_store.add_counters(workflow_id, 0, 0, 0, 0, successful).await?;

    Ok(successful)
}

/// Run one stage via `CreateIdempotentTask`/lease/remote-invoke/persist. If
/// an identical task already completed (restart-safety), its stored result
/// is reused without a remote call.
async fn run_stage(
    state: &AppState,
    invoker: &RemoteInvoker,
    workflow_id: &str,
    agent_type: &str,
    skill: &str,
    parameters: serde_json::Value,
    timeout_secs: u64,
) -> WatchResult<serde_json::Value> {
    let (task, is_new) = create_idempotent_task(
        &state.task_store,
        agent_type,
        skill,
        parameters.clone(),
        Some(workflow_id.to_string()),
        None,
        Some(workflow_id.to_string()),
        5,
    )
    .await?;

    if !is_new && task.status == TaskStatus::Completed {
        return Ok(task.result_data.clone().unwrap_or(serde_json::Value::Null));
    }

    let lock_token = Uuid::new_v4().to_string();
    let Some(leased) = state.task_store.acquire_lease(&task.task_id.to_string(), &lock_token, timeout_secs as i64 + 30).await? else {
        return Err(WatchError::LeaseContention {
            task_id: task.task_id.to_string(),
        });
    };
    let _ = leased;

    match invoker.invoke_skill(agent_type, skill, parameters, Some(workflow_id), timeout_secs).await {
        Ok(result) => {
            let hash = crate::idempotency::content_hash(serde_json::to_string(&result).unwrap_or_default().as_bytes());
            state.task_store.complete(&task.task_id.to_string(), result.clone(), &hash).await?;
            state.task_store.release_lease(&task.task_id.to_string(), &lock_token).await?;
            Ok(result)
        }
        Err(err) => {
            let final_status = state.task_store.fail(&task.task_id.to_string(), &err.to_string()).await?;
            if final_status == TaskStatus::Failed && !err.is_retriable() {
                return Err(err);
            }
            if final_status == TaskStatus::Failed {
                return Err(err);
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_timeouts_match_spec_defaults() {
        assert_eq!(STAGE_TIMEOUT_RETRIEVE_SECS, 60);
        assert_eq!(STAGE_TIMEOUT_FILTER_SECS, 60);
        assert_eq!(STAGE_TIMEOUT_SUMMARISE_SECS, 120);
        assert_eq!(STAGE_TIMEOUT_ALERT_SECS, 30);
    }
}
