//! Agent Cards and the skill-dispatch table (component C3).

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::utils::error::WatchResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub input_modes: Vec<String>,
    pub output_modes: Vec<String>,
    pub examples: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProvider {
    pub organization: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub version: String,
    pub url: String,
    pub provider: AgentProvider,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
}

impl AgentCard {
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>, url: impl Into<String>, skills: Vec<AgentSkill>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            url: url.into(),
            provider: AgentProvider {
                organization: "reddit-watch-hive".to_string(),
                url: "https://github.com".to_string(),
            },
            capabilities: AgentCapabilities {
                streaming: false,
                push_notifications: false,
            },
            skills,
        }
    }
}

pub type SkillResult = WatchResult<serde_json::Value>;
pub type SkillFuture = Pin<Box<dyn Future<Output = SkillResult> + Send>>;
pub type SkillHandler = Arc<dyn Fn(serde_json::Value) -> SkillFuture + Send + Sync>;

/// Maps skill name to handler for one agent process. Built once at startup
/// from the concrete agent's skill table (see `agents::*`).
#[derive(Clone, Default)]
pub struct SkillTable {
    handlers: HashMap<String, SkillHandler>,
}

impl SkillTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: SkillHandler) {
        self.handlers.insert(name.into(), handler);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<SkillHandler> {
        self.handlers.get(name).cloned()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn skill_table_dispatches_registered_handler() {
        let mut table = SkillTable::new();
        table.register(
            "echo",
            Arc::new(|params| Box::pin(async move { Ok(params) })),
        );

        let handler = table.get("echo").unwrap();
        let result = handler(json!({"hello": "world"})).await.unwrap();
        assert_eq!(result, json!({"hello": "world"}));
    }

    #[test]
    fn agent_card_serializes_with_expected_shape() {
        let card = AgentCard::new("retrieval-agent", "scans reddit", "http://localhost:8000", vec![]);
        let value = serde_json::to_value(&card).unwrap();
        assert_eq!(value["name"], "retrieval-agent");
        assert!(value.get("skills").is_some());
    }
}
