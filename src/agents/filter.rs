//! The `filter` agent: exposes `batch_filter_posts`, scoring each retrieved
//! post against the configured topics and keeping only those at or above the
//! relevance threshold.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::agent_card::{AgentCard, AgentSkill, SkillTable};
use crate::agents::collaborators::Classifier;
use crate::utils::error::{WatchError, WatchResult};

#[derive(Debug, Deserialize)]
struct FilterParams {
    #[serde(default)]
    posts: Vec<serde_json::Value>,
    #[serde(default)]
    topics: Vec<String>,
}

pub fn build(classifier: Arc<dyn Classifier>, relevance_threshold: f64, base_url: &str) -> (AgentCard, SkillTable) {
    let card = AgentCard::new(
        "filter-agent",
        "Scores retrieved posts for topical relevance",
        base_url,
        vec![AgentSkill {
            id: "batch_filter_posts".to_string(),
            name: "batch_filter_posts".to_string(),
            description: "Filter a batch of posts down to the ones relevant to the configured topics".to_string(),
            tags: vec!["filter".to_string(), "relevance".to_string()],
            input_modes: vec!["application/json".to_string()],
            output_modes: vec!["application/json".to_string()],
            examples: vec![],
        }],
    );

    let mut skills = SkillTable::new();
    skills.register(
        "batch_filter_posts",
        Arc::new(move |params| {
            let classifier = classifier.clone();
            Box::pin(batch_filter_posts(classifier, relevance_threshold, params))
        }),
    );

    (card, skills)
}

async fn batch_filter_posts(classifier: Arc<dyn Classifier>, relevance_threshold: f64, params: serde_json::Value) -> WatchResult<serde_json::Value> {
    let params: FilterParams = serde_json::from_value(params).map_err(|e| WatchError::Validation {
        reason: format!("invalid batch_filter_posts parameters: {e}"),
    })?;

    let mut relevant_posts = Vec::new();
    for post in &params.posts {
        let text = format!(
            "{} {}",
            post.get("title").and_then(serde_json::Value::as_str).unwrap_or(""),
            post.get("body").and_then(serde_json::Value::as_str).unwrap_or("")
        );
        let (score, matches) = classifier.score(&text, &params.topics).await?;
        if score >= relevance_threshold {
            let mut annotated = post.clone();
            if let serde_json::Value::Object(map) = &mut annotated {
                map.insert("relevance_score".to_string(), json!(score));
                map.insert("matched_topics".to_string(), json!(matches));
            }
            relevant_posts.push(annotated);
        }
    }

    Ok(json!({
        "processed": params.posts.len(),
        "relevant": relevant_posts.len(),
        "relevant_posts": relevant_posts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::collaborators::KeywordClassifier;

    #[tokio::test]
    async fn filters_out_posts_below_threshold() {
        let classifier: Arc<dyn Classifier> = Arc::new(KeywordClassifier { relevance_threshold: 0.5 });
        let params = json!({
            "posts": [
                {"title": "Claude Code release notes", "body": "new agent features"},
                {"title": "unrelated gardening tips", "body": "how to grow tomatoes"},
            ],
            "topics": ["Claude Code"],
        });

        let result = batch_filter_posts(classifier, 0.5, params).await.unwrap();
        assert_eq!(result["processed"], 2);
        assert_eq!(result["relevant"], 1);
    }
}
