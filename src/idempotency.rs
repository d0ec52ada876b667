//! Canonical hashing and idempotent task creation (component C2).
//!
//! Two requests with the same `(agent_type, skill_name, parameters,
//! workflow_id)` must resolve to the same task row rather than creating a
//! duplicate, even when `parameters` arrives with keys in a different order.

use sha2::{Digest, Sha256};

use crate::store::TaskStore;
use crate::tasks::task::{Task, TaskStatus};
use crate::utils::error::WatchResult;

/// SHA-256 hex digest of `value` serialized with sorted keys and compact
/// separators, so semantically identical JSON always hashes the same way.
#[must_use]
pub fn canonical_hash(value: &serde_json::Value) -> String {
    let canonical = canonicalize(value);
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex::encode(digest)
}

fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut sorted: Vec<(&String, &serde_json::Value)> = map.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k.clone(), canonicalize(v));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

/// Create a task if no equivalent one already exists (pending/running/
/// completed); otherwise return the existing one. This is the only
/// sanctioned way to construct a `Task` row.
pub async fn create_idempotent_task(
    store: &TaskStore,
    agent_type: &str,
    skill_name: &str,
    parameters: serde_json::Value,
    workflow_id: Option<String>,
    idempotency_key: Option<String>,
    correlation_id: Option<String>,
    priority: i32,
) -> WatchResult<(Task, bool)> {
    if let Some(key) = idempotency_key.as_deref() {
        if let Some(existing) = store.find_by_idempotency_key(key).await? {
            return Ok((existing, false));
        }
    }

    let hash = canonical_hash(&parameters);
    if let Some(existing) = store
        .find_active_by_key(agent_type, skill_name, &hash, workflow_id.as_deref())
        .await?
    {
        return Ok((existing, false));
    }

    let task = Task::new(
        agent_type,
        skill_name,
        parameters,
        hash,
        workflow_id,
        idempotency_key,
        correlation_id,
        priority,
    );
    store.insert(&task).await?;
    Ok((task, true))
}

/// SHA-256 hex digest of `bytes`, used to hash raw result payloads and
/// Reddit content bodies for the dedup and recovery stores.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// `min(2^attempt, 60)` minutes, the backoff schedule used both when
/// retrying a task inline and when the recovery daemon reschedules one.
#[must_use]
pub fn backoff_minutes(attempt: u32) -> i64 {
    2i64.saturating_pow(attempt).min(60)
}

#[must_use]
pub fn task_is_duplicate(status: TaskStatus) -> bool {
    status.counts_for_dedup()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Db;
    use serde_json::json;

    #[test]
    fn canonical_hash_ignores_key_order() {
        let a = json!({"subreddit": "rust", "limit": 25});
        let b = json!({"limit": 25, "subreddit": "rust"});
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn canonical_hash_differs_on_value_change() {
        let a = json!({"subreddit": "rust"});
        let b = json!({"subreddit": "golang"});
        assert_ne!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn backoff_caps_at_sixty_minutes() {
        assert_eq!(backoff_minutes(0), 1);
        assert_eq!(backoff_minutes(3), 8);
        assert_eq!(backoff_minutes(10), 60);
    }

    #[tokio::test]
    async fn repeated_create_returns_same_task() {
        let db = Db::open(":memory:").await.unwrap();
        let store = TaskStore::new(db);
        let params = json!({"subreddit": "rust"});

        let (first, created_first) = create_idempotent_task(
            &store,
            "retrieval-agent",
            "scan_subreddit",
            params.clone(),
            Some("wf-1".to_string()),
            None,
            None,
            5,
        )
        .await
        .unwrap();
        assert!(created_first);

        let (second, created_second) = create_idempotent_task(
            &store,
            "retrieval-agent",
            "scan_subreddit",
            params,
            Some("wf-1".to_string()),
            None,
            None,
            5,
        )
        .await
        .unwrap();
        assert!(!created_second);
        assert_eq!(first.task_id, second.task_id);
    }

    #[tokio::test]
    async fn idempotency_key_takes_priority_over_hash() {
        let db = Db::open(":memory:").await.unwrap();
        let store = TaskStore::new(db);
        let (first, _) = create_idempotent_task(
            &store,
            "alert-agent",
            "send_batch",
            json!({"batch_id": "b1"}),
            None,
            Some("idem-key-1".to_string()),
            None,
            5,
        )
        .await
        .unwrap();

        let (second, created) = create_idempotent_task(
            &store,
            "alert-agent",
            "send_batch",
            json!({"batch_id": "b1", "extra": "ignored"}),
            None,
            Some("idem-key-1".to_string()),
            None,
            5,
        )
        .await
        .unwrap();
        assert!(!created);
        assert_eq!(first.task_id, second.task_id);
    }
}
