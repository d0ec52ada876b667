//! The `alert` agent: exposes `sendBatch`, delegating to `alerting::Alerter`.

use std::sync::Arc;

use crate::agent_card::{AgentCard, AgentSkill, SkillTable};
use crate::alerting::{Alerter, SendBatchParams};
use crate::utils::error::WatchError;

pub fn build(alerter: Arc<Alerter>, base_url: &str) -> (AgentCard, SkillTable) {
    let card = AgentCard::new(
        "alert-agent",
        "Delivers aggregated alert batches over Slack and email",
        base_url,
        vec![AgentSkill {
            id: "sendBatch".to_string(),
            name: "sendBatch".to_string(),
            description: "Deliver an alert batch to the requested channels".to_string(),
            tags: vec!["alert".to_string(), "notification".to_string()],
            input_modes: vec!["application/json".to_string()],
            output_modes: vec!["application/json".to_string()],
            examples: vec![],
        }],
    );

    let mut skills = SkillTable::new();
    skills.register(
        "sendBatch",
        Arc::new(move |params| {
            let alerter = alerter.clone();
            Box::pin(async move {
                let parsed: SendBatchParams = serde_json::from_value(params).map_err(|e| WatchError::Validation {
                    reason: format!("invalid sendBatch parameters: {e}"),
                })?;
                let result = alerter.send_batch(parsed).await?;
                serde_json::to_value(result).map_err(|e| WatchError::Validation {
                    reason: format!("failed to serialise sendBatch result: {e}"),
                })
            })
        }),
    );

    (card, skills)
}
