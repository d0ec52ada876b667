//! The `retrieval` agent: exposes `fetch_posts_by_topic`, fanning out across
//! `(topic, subreddit)` pairs through a bounded worker pool and deduplicating
//! against `ContentDedup` before returning newly-seen posts.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::agent_card::{AgentCard, AgentSkill, SkillTable};
use crate::agents::collaborators::ContentSource;
use crate::idempotency::content_hash;
use crate::store::DedupStore;
use crate::tasks::dedup::{ContentDedup, ContentType};
use crate::utils::error::{WatchError, WatchResult};

#[derive(Debug, Deserialize)]
struct FetchPostsParams {
    topics: Vec<String>,
    subreddits: Vec<String>,
    #[serde(default = "default_limit")]
    limit_per_pair: u32,
}

fn default_limit() -> u32 {
    25
}

pub fn build(content_source: Arc<dyn ContentSource>, dedup_store: DedupStore, worker_pool_size: usize, base_url: &str) -> (AgentCard, SkillTable) {
    let card = AgentCard::new(
        "retrieval-agent",
        "Fetches Reddit posts for a set of topics and subreddits",
        base_url,
        vec![AgentSkill {
            id: "fetch_posts_by_topic".to_string(),
            name: "fetch_posts_by_topic".to_string(),
            description: "Fetch posts matching the given topics across the given subreddits".to_string(),
            tags: vec!["reddit".to_string(), "retrieval".to_string()],
            input_modes: vec!["application/json".to_string()],
            output_modes: vec!["application/json".to_string()],
            examples: vec![],
        }],
    );

    let mut skills = SkillTable::new();
    let permits = worker_pool_size.max(1);
    skills.register(
        "fetch_posts_by_topic",
        Arc::new(move |params| {
            let content_source = content_source.clone();
            let dedup_store = dedup_store.clone();
            Box::pin(fetch_posts_by_topic(content_source, dedup_store, permits, params))
        }),
    );

    (card, skills)
}

async fn fetch_posts_by_topic(
    content_source: Arc<dyn ContentSource>,
    dedup_store: DedupStore,
    worker_pool_size: usize,
    params: serde_json::Value,
) -> WatchResult<serde_json::Value> {
    let params: FetchPostsParams = serde_json::from_value(params).map_err(|e| WatchError::Validation {
        reason: format!("invalid fetch_posts_by_topic parameters: {e}"),
    })?;

    let pairs: Vec<(String, String)> = params
        .topics
        .iter()
        .flat_map(|topic| params.subreddits.iter().map(move |sub| (topic.clone(), sub.clone())))
        .collect();

    let semaphore = Arc::new(Semaphore::new(worker_pool_size));
    let mut handles = Vec::new();

    for (topic, subreddit) in pairs {
        let content_source = content_source.clone();
        let semaphore = semaphore.clone();
        let limit = params.limit_per_pair;
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            content_source.fetch_posts(&topic, &subreddit, limit).await
        }));
    }

    let mut seen_posts = Vec::new();
    for handle in handles {
        let fetched = match handle.await {
            Ok(Ok(posts)) => posts,
            Ok(Err(_)) | Err(_) => continue,
        };

        for post in fetched {
            let hash = content_hash(post.body.as_bytes());
            let entry = ContentDedup::new(hash, ContentType::Post, post.external_id.clone());
            if dedup_store.register_if_new(&entry).await? {
                seen_posts.push(json!({
                    "external_id": post.external_id,
                    "subreddit": post.subreddit,
                    "title": post.title,
                    "body": post.body,
                    "url": post.url,
                    "author": post.author,
                }));
            }
        }
    }

    Ok(json!({
        "total_posts": seen_posts.len(),
        "posts": seen_posts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::collaborators::Post;
    use crate::store::Db;
    use async_trait::async_trait;

    struct StubSource;

    #[async_trait]
    impl ContentSource for StubSource {
        async fn fetch_posts(&self, topic: &str, subreddit: &str, _limit: u32) -> WatchResult<Vec<Post>> {
            Ok(vec![Post {
                external_id: format!("{subreddit}-1"),
                subreddit: subreddit.to_string(),
                title: format!("post about {topic}"),
                body: "interesting content".to_string(),
                url: None,
                author: None,
            }])
        }
    }

    #[tokio::test]
    async fn fetch_posts_deduplicates_across_calls() {
        let db = Db::open(":memory:").await.unwrap();
        let dedup_store = DedupStore::new(db);
        let source: Arc<dyn ContentSource> = Arc::new(StubSource);

        let params = json!({"topics": ["rust"], "subreddits": ["programming"]});
        let first = fetch_posts_by_topic(source.clone(), dedup_store.clone(), 2, params.clone()).await.unwrap();
        assert_eq!(first["total_posts"], 1);

        let second = fetch_posts_by_topic(source, dedup_store, 2, params).await.unwrap();
        assert_eq!(second["total_posts"], 0);
    }
}
