//! External collaborator interfaces: the content source, summariser, and
//! relevance classifier this crate consumes but does not implement. Each
//! trait's default implementation is a thin HTTP client over a configured
//! base URL so an agent binary runs end-to-end against a real collaborator
//! service without this crate owning its domain logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::utils::error::{WatchError, WatchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub external_id: String,
    pub subreddit: String,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    pub author: Option<String>,
}

/// `FetchPosts(topic, subreddit, limit) -> []Post`
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_posts(&self, topic: &str, subreddit: &str, limit: u32) -> WatchResult<Vec<Post>>;
}

/// `Summarise(text, maxLen) -> string`
#[async_trait]
pub trait Summariser: Send + Sync {
    async fn summarise(&self, text: &str, max_len: usize) -> WatchResult<String>;
}

/// `Score(text, topics) -> (score, matches)`
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn score(&self, text: &str, topics: &[String]) -> WatchResult<(f64, Vec<String>)>;
}

/// HTTP-backed `ContentSource` calling a configured Reddit-API-wrapper
/// service at `{base_url}/posts`.
pub struct HttpContentSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpContentSource {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_posts(&self, topic: &str, subreddit: &str, limit: u32) -> WatchResult<Vec<Post>> {
        let response = self
            .client
            .get(format!("{}/posts", self.base_url.trim_end_matches('/')))
            .query(&[("topic", topic), ("subreddit", subreddit)])
            .query(&[("limit", limit)])
            .send()
            .await
            .map_err(|e| WatchError::Transport {
                agent_type: "retrieval".to_string(),
                skill: "fetch_posts_by_topic".to_string(),
                reason: e.to_string(),
            })?;

        response.json::<Vec<Post>>().await.map_err(|e| WatchError::Transport {
            agent_type: "retrieval".to_string(),
            skill: "fetch_posts_by_topic".to_string(),
            reason: e.to_string(),
        })
    }
}

/// HTTP-backed `Summariser` calling a configured LLM-completion service at
/// `{base_url}/summarise`.
pub struct HttpSummariser {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSummariser {
    #[must_use]
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl Summariser for HttpSummariser {
    async fn summarise(&self, text: &str, max_len: usize) -> WatchResult<String> {
        let response = self
            .client
            .post(format!("{}/summarise", self.base_url.trim_end_matches('/')))
            .json(&json!({"text": text, "max_len": max_len}))
            .send()
            .await
            .map_err(|e| WatchError::Transport {
                agent_type: "summarise".to_string(),
                skill: "summarizeContent".to_string(),
                reason: e.to_string(),
            })?;

        let body: serde_json::Value = response.json().await.map_err(|e| WatchError::Transport {
            agent_type: "summarise".to_string(),
            skill: "summarizeContent".to_string(),
            reason: e.to_string(),
        })?;

        body.get("summary")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| WatchError::Upstream {
                agent_type: "summarise".to_string(),
                skill: "summarizeContent".to_string(),
                reason: "summariser response missing `summary` field".to_string(),
            })
    }
}

/// Keyword-overlap `Classifier`. Semantic similarity against an embedding
/// service is the natural production backend; this default needs no
/// external dependency and is good enough to drive the filter stage in
/// development and tests.
pub struct KeywordClassifier {
    pub relevance_threshold: f64,
}

#[async_trait]
impl Classifier for KeywordClassifier {
    async fn score(&self, text: &str, topics: &[String]) -> WatchResult<(f64, Vec<String>)> {
        let lower = text.to_lowercase();
        let matches: Vec<String> = topics.iter().filter(|t| lower.contains(&t.to_lowercase())).cloned().collect();
        let score = if topics.is_empty() {
            0.0
        } else {
            matches.len() as f64 / topics.len() as f64
        };
        Ok((score, matches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn keyword_classifier_scores_by_topic_overlap() {
        let classifier = KeywordClassifier { relevance_threshold: 0.5 };
        let (score, matches) = classifier
            .score("Discussing Claude Code and Rust tooling", &["Claude Code".to_string(), "Golang".to_string()])
            .await
            .unwrap();
        assert_eq!(matches, vec!["Claude Code".to_string()]);
        assert!((score - 0.5).abs() < f64::EPSILON);
    }
}
