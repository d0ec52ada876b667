//! Service registry (component C3 support): where each agent publishes its
//! Agent Card and URL so peers can discover it via `/discover`.
//!
//! Modeled as a trait so an in-process implementation can back tests while
//! a Redis-backed implementation backs the real deployment, sharing one
//! interface the way the teacher's persistence layer separates
//! `StorageProvider` from its SQLite/memory/filesystem backends.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::utils::error::{WatchError, WatchResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub url: String,
    pub name: String,
    pub version: String,
    pub heartbeat_at: chrono::DateTime<Utc>,
}

#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Publish (or refresh) this agent's entry, keyed `agent:{agent_type}`,
    /// with a TTL of roughly `2 * heartbeat_interval`.
    async fn register(&self, agent_type: &str, entry: RegistryEntry, ttl_secs: u64) -> WatchResult<()>;

    /// Remove this agent's entry, called on graceful shutdown.
    async fn deregister(&self, agent_type: &str) -> WatchResult<()>;

    /// All currently-registered peers, for `/discover`.
    async fn list(&self) -> WatchResult<HashMap<String, RegistryEntry>>;

    async fn get(&self, agent_type: &str) -> WatchResult<Option<RegistryEntry>>;
}

/// In-process registry with no TTL enforcement beyond what callers check
/// manually; used by tests and by single-process `run-cycle`/dev setups.
#[derive(Default)]
pub struct InMemoryRegistry {
    entries: RwLock<HashMap<String, (RegistryEntry, chrono::DateTime<Utc>)>>,
}

impl InMemoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ServiceRegistry for InMemoryRegistry {
    async fn register(&self, agent_type: &str, entry: RegistryEntry, ttl_secs: u64) -> WatchResult<()> {
        let expires = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        self.entries.write().await.insert(agent_type.to_string(), (entry, expires));
        Ok(())
    }

    async fn deregister(&self, agent_type: &str) -> WatchResult<()> {
        self.entries.write().await.remove(agent_type);
        Ok(())
    }

    async fn list(&self) -> WatchResult<HashMap<String, RegistryEntry>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|(_, (_, expires))| *expires > now)
            .map(|(k, (entry, _))| (k.clone(), entry.clone()))
            .collect())
    }

    async fn get(&self, agent_type: &str) -> WatchResult<Option<RegistryEntry>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(agent_type)
            .filter(|(_, expires)| *expires > now)
            .map(|(entry, _)| entry.clone()))
    }
}

/// Redis-backed registry: one hash per agent type at key `agent:{type}`,
/// refreshed with `HSET` + `EXPIRE`, read back with `HGETALL`, removed with
/// `HDEL`/`DEL` on shutdown.
pub struct RedisRegistry {
    client: redis::Client,
}

impl RedisRegistry {
    pub fn new(redis_url: &str) -> WatchResult<Self> {
        let client = redis::Client::open(redis_url).map_err(|e| WatchError::Configuration {
            reason: format!("invalid redis_url: {e}"),
        })?;
        Ok(Self { client })
    }

    async fn connection(&self) -> WatchResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| WatchError::Transport {
                agent_type: "registry".to_string(),
                skill: "connect".to_string(),
                reason: e.to_string(),
            })
    }

    fn key(agent_type: &str) -> String {
        format!("agent:{agent_type}")
    }
}

#[async_trait]
impl ServiceRegistry for RedisRegistry {
    async fn register(&self, agent_type: &str, entry: RegistryEntry, ttl_secs: u64) -> WatchResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let key = Self::key(agent_type);
        let () = conn
            .hset_multiple(
                &key,
                &[
                    ("url", entry.url.clone()),
                    ("name", entry.name.clone()),
                    ("version", entry.version.clone()),
                    ("heartbeat_at", entry.heartbeat_at.to_rfc3339()),
                ],
            )
            .await
            .map_err(|e| WatchError::Transport {
                agent_type: agent_type.to_string(),
                skill: "registry_hset".to_string(),
                reason: e.to_string(),
            })?;
        let _: bool = conn.expire(&key, ttl_secs as i64).await.map_err(|e| WatchError::Transport {
            agent_type: agent_type.to_string(),
            skill: "registry_expire".to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn deregister(&self, agent_type: &str) -> WatchResult<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let _: i64 = conn.del(Self::key(agent_type)).await.map_err(|e| WatchError::Transport {
            agent_type: agent_type.to_string(),
            skill: "registry_del".to_string(),
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn list(&self) -> WatchResult<HashMap<String, RegistryEntry>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn.keys("agent:*").await.map_err(|e| WatchError::Transport {
            agent_type: "registry".to_string(),
            skill: "registry_keys".to_string(),
            reason: e.to_string(),
        })?;

        let mut out = HashMap::new();
        for key in keys {
            let fields: HashMap<String, String> =
                conn.hgetall(&key).await.map_err(|e| WatchError::Transport {
                    agent_type: "registry".to_string(),
                    skill: "registry_hgetall".to_string(),
                    reason: e.to_string(),
                })?;
            if let Some(entry) = entry_from_fields(&fields) {
                let agent_type = key.strip_prefix("agent:").unwrap_or(&key).to_string();
                out.insert(agent_type, entry);
            }
        }
        Ok(out)
    }

    async fn get(&self, agent_type: &str) -> WatchResult<Option<RegistryEntry>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> =
            conn.hgetall(Self::key(agent_type)).await.map_err(|e| WatchError::Transport {
                agent_type: agent_type.to_string(),
                skill: "registry_hgetall".to_string(),
                reason: e.to_string(),
            })?;
        Ok(entry_from_fields(&fields))
    }
}

fn entry_from_fields(fields: &HashMap<String, String>) -> Option<RegistryEntry> {
    Some(RegistryEntry {
        url: fields.get("url")?.clone(),
        name: fields.get("name")?.clone(),
        version: fields.get("version")?.clone(),
        heartbeat_at: fields.get("heartbeat_at")?.parse().ok()?,
    })
}

pub type SharedRegistry = Arc<dyn ServiceRegistry>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_list_then_deregister() {
        let registry = InMemoryRegistry::new();
        let entry = RegistryEntry {
            url: "http://localhost:8000".to_string(),
            name: "retrieval-agent".to_string(),
            version: "0.2.0".to_string(),
            heartbeat_at: Utc::now(),
        };
        registry.register("retrieval", entry, 60).await.unwrap();

        let all = registry.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("retrieval"));

        registry.deregister("retrieval").await.unwrap();
        let all = registry.list().await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn expired_entries_are_not_listed() {
        let registry = InMemoryRegistry::new();
        let entry = RegistryEntry {
            url: "http://localhost:8001".to_string(),
            name: "filter-agent".to_string(),
            version: "0.2.0".to_string(),
            heartbeat_at: Utc::now(),
        };
        registry.register("filter", entry, 0).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let all = registry.list().await.unwrap();
        assert!(all.is_empty());
    }
}
