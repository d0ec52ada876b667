//! Per-(agent, endpoint) circuit breakers (component C4), guarding remote
//! A2A calls from hammering an agent that's already failing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::utils::error::WatchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Breaker {
    failure_threshold: u64,
    recovery_timeout: Duration,
    failure_count: AtomicU64,
    last_failure_time: RwLock<Option<Instant>>,
    state: RwLock<CircuitState>,
}

impl Breaker {
    fn new(failure_threshold: u64, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            failure_count: AtomicU64::new(0),
            last_failure_time: RwLock::new(None),
            state: RwLock::new(CircuitState::Closed),
        }
    }

    async fn pre_check(&self, key: &str) -> Result<(), WatchError> {
        let mut state = self.state.write().await;
        match *state {
            CircuitState::Open => {
                let should_attempt = match *self.last_failure_time.read().await {
                    Some(last) => last.elapsed() >= self.recovery_timeout,
                    None => false,
                };
                if should_attempt {
                    *state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(WatchError::CircuitOpen {
                        breaker_key: key.to_string(),
                    })
                }
            }
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
        }
    }

    async fn on_success(&self) {
        self.failure_count.store(0, Ordering::Release);
        *self.state.write().await = CircuitState::Closed;
        *self.last_failure_time.write().await = None;
    }

    async fn on_failure(&self) {
        let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        *self.last_failure_time.write().await = Some(Instant::now());
        if failures >= self.failure_threshold {
            *self.state.write().await = CircuitState::Open;
        }
    }

    async fn state(&self) -> CircuitState {
        *self.state.read().await
    }

    fn failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::Acquire)
    }
}

/// A registry of independent breakers keyed by `"{agent_type}:{endpoint}"`,
/// so one misbehaving agent's skill doesn't trip the breaker for every
/// other agent in the mesh.
pub struct CircuitBreakerRegistry {
    failure_threshold: u64,
    recovery_timeout: Duration,
    breakers: DashMap<String, Breaker>,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(failure_threshold: u64, recovery_timeout_secs: u64) -> Self {
        Self {
            failure_threshold,
            recovery_timeout: Duration::from_secs(recovery_timeout_secs),
            breakers: DashMap::new(),
        }
    }

    fn key(agent_type: &str, endpoint: &str) -> String {
        format!("{agent_type}:{endpoint}")
    }

    /// Run `operation` through the breaker for `(agent_type, endpoint)`,
    /// tracking failures/successes and rejecting immediately while open.
    pub async fn execute<F, Fut, T, E>(
        &self,
        agent_type: &str,
        endpoint: &str,
        operation: F,
    ) -> Result<T, WatchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let key = Self::key(agent_type, endpoint);
        self.breakers
            .entry(key.clone())
            .or_insert_with(|| Breaker::new(self.failure_threshold, self.recovery_timeout));

        let breaker = self.breakers.get(&key).expect("just inserted");
        breaker.pre_check(&key).await?;

        match operation().await {
            Ok(value) => {
                breaker.on_success().await;
                Ok(value)
            }
            Err(error) => {
                breaker.on_failure().await;
                Err(WatchError::Transport {
                    agent_type: agent_type.to_string(),
                    skill: endpoint.to_string(),
                    reason: error.to_string(),
                })
            }
        }
    }

    pub async fn state(&self, agent_type: &str, endpoint: &str) -> CircuitState {
        let key = Self::key(agent_type, endpoint);
        match self.breakers.get(&key) {
            Some(b) => b.state().await,
            None => CircuitState::Closed,
        }
    }

    #[must_use]
    pub fn failure_count(&self, agent_type: &str, endpoint: &str) -> u64 {
        let key = Self::key(agent_type, endpoint);
        self.breakers.get(&key).map_or(0, |b| b.failure_count())
    }

    /// Snapshot of every known breaker's state, for the `/metrics` endpoint.
    pub fn snapshot(&self) -> Vec<(String, CircuitState)> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), snapshot_state(entry.value())))
            .collect()
    }
}

fn snapshot_state(breaker: &Breaker) -> CircuitState {
    breaker.state.try_read().map(|s| *s).unwrap_or(CircuitState::Closed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn closed_state_allows_success() {
        let registry = CircuitBreakerRegistry::new(3, 1);
        let result = registry
            .execute("retrieval-agent", "scan_subreddit", || async { Ok::<i32, String>(42) })
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn opens_after_threshold_and_isolates_by_key() {
        let registry = CircuitBreakerRegistry::new(2, 60);
        for _ in 0..2 {
            let _ = registry
                .execute("retrieval-agent", "scan_subreddit", || async { Err::<i32, String>("boom".into()) })
                .await;
        }
        let blocked = registry
            .execute("retrieval-agent", "scan_subreddit", || async { Ok::<i32, String>(1) })
            .await;
        assert!(matches!(blocked, Err(WatchError::CircuitOpen { .. })));

        let other_endpoint_ok = registry
            .execute("retrieval-agent", "health", || async { Ok::<i32, String>(1) })
            .await;
        assert!(other_endpoint_ok.is_ok());
    }

    #[tokio::test]
    async fn half_open_recovers_on_success() {
        let registry = CircuitBreakerRegistry::new(1, 0);
        let _ = registry
            .execute("alert-agent", "send_batch", || async { Err::<i32, String>("boom".into()) })
            .await;
        sleep(Duration::from_millis(10)).await;
        let result = registry
            .execute("alert-agent", "send_batch", || async { Ok::<i32, String>(7) })
            .await;
        assert!(result.is_ok());
        assert_eq!(registry.state("alert-agent", "send_batch").await, CircuitState::Closed);
    }
}
