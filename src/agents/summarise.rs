//! The `summarise` agent: exposes `summarizeContent`, condensing the
//! relevant posts from the filter stage into a single alert-ready summary.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::agent_card::{AgentCard, AgentSkill, SkillTable};
use crate::agents::collaborators::Summariser;
use crate::utils::error::{WatchError, WatchResult};

const DEFAULT_MAX_LEN: usize = 500;

#[derive(Debug, Deserialize)]
struct SummariseParams {
    #[serde(default)]
    relevant_posts: Vec<serde_json::Value>,
    #[serde(default = "default_max_len")]
    max_len: usize,
}

fn default_max_len() -> usize {
    DEFAULT_MAX_LEN
}

pub fn build(summariser: Arc<dyn Summariser>, base_url: &str) -> (AgentCard, SkillTable) {
    let card = AgentCard::new(
        "summarise-agent",
        "Summarises a batch of relevant posts with an LLM",
        base_url,
        vec![AgentSkill {
            id: "summarizeContent".to_string(),
            name: "summarizeContent".to_string(),
            description: "Produce a short summary of the relevant posts for this cycle".to_string(),
            tags: vec!["summarise".to_string(), "llm".to_string()],
            input_modes: vec!["application/json".to_string()],
            output_modes: vec!["application/json".to_string()],
            examples: vec![],
        }],
    );

    let mut skills = SkillTable::new();
    skills.register("summarizeContent", Arc::new(move |params| {
        let summariser = summariser.clone();
        Box::pin(summarize_content(summariser, params))
    }));

    (card, skills)
}

async fn summarize_content(summariser: Arc<dyn Summariser>, params: serde_json::Value) -> WatchResult<serde_json::Value> {
    let params: SummariseParams = serde_json::from_value(params).map_err(|e| WatchError::Validation {
        reason: format!("invalid summarizeContent parameters: {e}"),
    })?;

    let combined: String = params
        .relevant_posts
        .iter()
        .map(|post| {
            format!(
                "- {}: {}\n",
                post.get("title").and_then(serde_json::Value::as_str).unwrap_or(""),
                post.get("body").and_then(serde_json::Value::as_str).unwrap_or("")
            )
        })
        .collect();

    let summary_text = summariser.summarise(&combined, params.max_len).await?;

    Ok(json!({
        "summary_text": summary_text,
        "stats": {"posts_summarised": params.relevant_posts.len()},
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoSummariser;

    #[async_trait]
    impl Summariser for EchoSummariser {
        async fn summarise(&self, text: &str, max_len: usize) -> WatchResult<String> {
            Ok(text.chars().take(max_len).collect())
        }
    }

    #[tokio::test]
    async fn summarises_relevant_posts() {
        let summariser: Arc<dyn Summariser> = Arc::new(EchoSummariser);
        let params = json!({
            "relevant_posts": [{"title": "t1", "body": "b1"}],
            "max_len": 50,
        });
        let result = summarize_content(summariser, params).await.unwrap();
        assert!(result["summary_text"].as_str().unwrap().contains("t1"));
        assert_eq!(result["stats"]["posts_summarised"], 1);
    }
}
