//! Remote skill invocation: looks up a peer's URL in the registry and calls
//! its `/skills/{name}` endpoint through the circuit breaker registry.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::infrastructure::circuit_breaker::CircuitBreakerRegistry;
use crate::registry::SharedRegistry;
use crate::utils::error::{WatchError, WatchResult};

pub struct RemoteInvoker {
    client: reqwest::Client,
    registry: SharedRegistry,
    breakers: Arc<CircuitBreakerRegistry>,
    api_key: String,
}

impl RemoteInvoker {
    #[must_use]
    pub fn new(client: reqwest::Client, registry: SharedRegistry, breakers: Arc<CircuitBreakerRegistry>, api_key: String) -> Self {
        Self {
            client,
            registry,
            breakers,
            api_key,
        }
    }

    /// Invoke `skill` on the agent registered under `agent_type`, through
    /// the breaker keyed `(agent_type, skill)`, with `timeout_secs` budget.
    pub async fn invoke_skill(
        &self,
        agent_type: &str,
        skill: &str,
        parameters: serde_json::Value,
        correlation_id: Option<&str>,
        timeout_secs: u64,
    ) -> WatchResult<serde_json::Value> {
        let entry = self.registry.get(agent_type).await?.ok_or_else(|| WatchError::Transport {
            agent_type: agent_type.to_string(),
            skill: skill.to_string(),
            reason: "agent not found in registry".to_string(),
        })?;

        let url = format!("{}/skills/{}", entry.url.trim_end_matches('/'), skill);
        let client = self.client.clone();
        let api_key = self.api_key.clone();
        let body = json!({
            "parameters": parameters,
            "context": {
                "correlation_id": correlation_id,
                "timestamp": chrono::Utc::now(),
            }
        });

        let response = self
            .breakers
            .execute(agent_type, skill, move || {
                let client = client.clone();
                let url = url.clone();
                let api_key = api_key.clone();
                let body = body.clone();
                async move {
                    client
                        .post(&url)
                        .bearer_auth(api_key)
                        .timeout(Duration::from_secs(timeout_secs))
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| e.to_string())?
                        .error_for_status()
                        .map_err(|e| e.to_string())?
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| e.to_string())
                }
            })
            .await?;

        if response.get("status").and_then(|s| s.as_str()) == Some("error") {
            let reason = response
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("unknown upstream error")
                .to_string();
            return Err(WatchError::Upstream {
                agent_type: agent_type.to_string(),
                skill: skill.to_string(),
                reason,
            });
        }

        Ok(response.get("result").cloned().unwrap_or(serde_json::Value::Null))
    }
}
