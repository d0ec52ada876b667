//! Process-wide configuration, loaded once from environment variables with
//! documented defaults for everything that the source's own `config.py`
//! settings object treats as optional.

use crate::utils::error::{WatchError, WatchResult};
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level configuration singleton.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub workflow: WorkflowConfig,
    pub alert: AlertConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub a2a_host: String,
    pub a2a_port: u16,
    pub coordinator_agent_url: String,
    pub retrieval_agent_url: String,
    pub filter_agent_url: String,
    pub summarise_agent_url: String,
    pub alert_agent_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub database_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub redis_url: String,
    pub heartbeat_interval_secs: u64,
    pub stale_after_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub a2a_api_key: String,
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub burst_limit: u32,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub whitelist_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u64,
    pub recovery_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    pub monitoring_interval_hours: u64,
    pub reddit_topics: Vec<String>,
    pub reddit_subreddits: Vec<String>,
    pub relevance_threshold: f64,
    pub semantic_similarity_weight: f64,
    pub worker_pool_size: usize,
    pub recovery_check_interval_secs: u64,
    pub retrieve_timeout_secs: u64,
    pub filter_timeout_secs: u64,
    pub summarise_timeout_secs: u64,
    pub alert_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub slack_webhook_url: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub email_recipients: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                a2a_host: "0.0.0.0".to_string(),
                a2a_port: 8000,
                coordinator_agent_url: "http://localhost:8000".to_string(),
                retrieval_agent_url: "http://localhost:8001".to_string(),
                filter_agent_url: "http://localhost:8002".to_string(),
                summarise_agent_url: "http://localhost:8003".to_string(),
                alert_agent_url: "http://localhost:8004".to_string(),
                request_timeout_secs: 30,
            },
            database: DatabaseConfig {
                database_url: "sqlite://watch_hive.db".to_string(),
            },
            registry: RegistryConfig {
                redis_url: "redis://localhost:6379".to_string(),
                heartbeat_interval_secs: 30,
                stale_after_secs: 300,
            },
            auth: AuthConfig {
                a2a_api_key: "dev-shared-key".to_string(),
                jwt_secret: "dev-jwt-secret".to_string(),
            },
            rate_limit: RateLimitConfig {
                burst_limit: 10,
                requests_per_minute: 60,
                requests_per_hour: 1000,
                whitelist_cidrs: vec!["127.0.0.0/8".to_string(), "::1/128".to_string()],
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                recovery_timeout_secs: 60,
            },
            workflow: WorkflowConfig {
                monitoring_interval_hours: 4,
                reddit_topics: vec!["Claude Code".to_string()],
                reddit_subreddits: vec!["MachineLearning".to_string()],
                relevance_threshold: 0.7,
                semantic_similarity_weight: 0.7,
                worker_pool_size: 4,
                recovery_check_interval_secs: 300,
                retrieve_timeout_secs: 60,
                filter_timeout_secs: 60,
                summarise_timeout_secs: 120,
                alert_timeout_secs: 30,
            },
            alert: AlertConfig {
                slack_webhook_url: None,
                smtp_host: None,
                smtp_port: 587,
                smtp_username: None,
                smtp_password: None,
                smtp_from: None,
                email_recipients: Vec::new(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to the
    /// documented defaults, then validate it.
    pub fn load() -> WatchResult<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = env::var("A2A_HOST") {
            self.server.a2a_host = v;
        }
        if let Ok(v) = env::var("A2A_PORT") {
            if let Ok(p) = v.parse() {
                self.server.a2a_port = p;
            }
        }
        if let Ok(v) = env::var("COORDINATOR_AGENT_URL") {
            self.server.coordinator_agent_url = v;
        }
        if let Ok(v) = env::var("RETRIEVAL_AGENT_URL") {
            self.server.retrieval_agent_url = v;
        }
        if let Ok(v) = env::var("FILTER_AGENT_URL") {
            self.server.filter_agent_url = v;
        }
        if let Ok(v) = env::var("SUMMARISE_AGENT_URL") {
            self.server.summarise_agent_url = v;
        }
        if let Ok(v) = env::var("ALERT_AGENT_URL") {
            self.server.alert_agent_url = v;
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.database_url = v;
        }
        if let Ok(v) = env::var("REDIS_URL") {
            self.registry.redis_url = v;
        }
        if let Ok(v) = env::var("A2A_API_KEY") {
            self.auth.a2a_api_key = v;
        }
        if let Ok(v) = env::var("JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Ok(v) = env::var("RATE_LIMIT_BURST_LIMIT") {
            if let Ok(n) = v.parse() {
                self.rate_limit.burst_limit = n;
            }
        }
        if let Ok(v) = env::var("RATE_LIMIT_REQUESTS_PER_MINUTE") {
            if let Ok(n) = v.parse() {
                self.rate_limit.requests_per_minute = n;
            }
        }
        if let Ok(v) = env::var("RATE_LIMIT_REQUESTS_PER_HOUR") {
            if let Ok(n) = v.parse() {
                self.rate_limit.requests_per_hour = n;
            }
        }
        if let Ok(v) = env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.circuit_breaker.failure_threshold = n;
            }
        }
        if let Ok(v) = env::var("CIRCUIT_BREAKER_RECOVERY_TIMEOUT_SECS") {
            if let Ok(n) = v.parse() {
                self.circuit_breaker.recovery_timeout_secs = n;
            }
        }
        if let Ok(v) = env::var("MONITORING_INTERVAL_HOURS") {
            if let Ok(n) = v.parse() {
                self.workflow.monitoring_interval_hours = n;
            }
        }
        if let Ok(v) = env::var("REDDIT_TOPICS") {
            self.workflow.reddit_topics = split_csv(&v);
        }
        if let Ok(v) = env::var("REDDIT_SUBREDDITS") {
            self.workflow.reddit_subreddits = split_csv(&v);
        }
        if let Ok(v) = env::var("RELEVANCE_THRESHOLD") {
            if let Ok(n) = v.parse() {
                self.workflow.relevance_threshold = n;
            }
        }
        if let Ok(v) = env::var("SEMANTIC_SIMILARITY_WEIGHT") {
            if let Ok(n) = v.parse() {
                self.workflow.semantic_similarity_weight = n;
            }
        }
        if let Ok(v) = env::var("SLACK_WEBHOOK_URL") {
            self.alert.slack_webhook_url = Some(v);
        }
        if let Ok(v) = env::var("SMTP_HOST") {
            self.alert.smtp_host = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PORT") {
            if let Ok(n) = v.parse() {
                self.alert.smtp_port = n;
            }
        }
        if let Ok(v) = env::var("SMTP_USERNAME") {
            self.alert.smtp_username = Some(v);
        }
        if let Ok(v) = env::var("SMTP_PASSWORD") {
            self.alert.smtp_password = Some(v);
        }
        if let Ok(v) = env::var("SMTP_FROM") {
            self.alert.smtp_from = Some(v);
        }
        if let Ok(v) = env::var("EMAIL_RECIPIENTS") {
            self.alert.email_recipients = split_csv(&v);
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = env::var("LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Validate the field constraints the source's settings validators
    /// enforce: URL schemes, port ranges, and the `0.0..=1.0` ranges for the
    /// relevance/weight knobs.
    pub fn validate(&self) -> WatchResult<()> {
        if !(self.database.database_url.starts_with("sqlite://")
            || self.database.database_url.starts_with("postgres://"))
        {
            return Err(WatchError::Configuration {
                reason: format!(
                    "database_url must use sqlite:// or postgres://, got {}",
                    self.database.database_url
                ),
            });
        }
        if !self.registry.redis_url.starts_with("redis://") {
            return Err(WatchError::Configuration {
                reason: format!(
                    "redis_url must use redis://, got {}",
                    self.registry.redis_url
                ),
            });
        }
        if !(1024..=65535).contains(&self.server.a2a_port) {
            return Err(WatchError::Configuration {
                reason: format!("a2a_port must be in 1024..=65535, got {}", self.server.a2a_port),
            });
        }
        if !(0.0..=1.0).contains(&self.workflow.relevance_threshold) {
            return Err(WatchError::Configuration {
                reason: "relevance_threshold must be in 0.0..=1.0".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.workflow.semantic_similarity_weight) {
            return Err(WatchError::Configuration {
                reason: "semantic_similarity_weight must be in 0.0..=1.0".to_string(),
            });
        }
        if self.auth.a2a_api_key.is_empty() {
            return Err(WatchError::Configuration {
                reason: "a2a_api_key must not be empty".to_string(),
            });
        }
        if self.auth.jwt_secret.is_empty() {
            return Err(WatchError::Configuration {
                reason: "jwt_secret must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Resolve the base URL for a peer agent type (`retrieval`, `filter`,
    /// `summarise`, `alert`, `coordinator`).
    #[must_use]
    pub fn agent_url(&self, agent_type: &str) -> Option<&str> {
        match agent_type {
            "coordinator" => Some(&self.server.coordinator_agent_url),
            "retrieval" => Some(&self.server.retrieval_agent_url),
            "filter" => Some(&self.server.filter_agent_url),
            "summarise" => Some(&self.server.summarise_agent_url),
            "alert" => Some(&self.server.alert_agent_url),
            _ => None,
        }
    }
}

fn split_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_database_url() {
        let mut config = Config::default();
        config.database.database_url = "mysql://x".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_relevance_threshold() {
        let mut config = Config::default();
        config.workflow.relevance_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_privileged_port() {
        let mut config = Config::default();
        config.server.a2a_port = 80;
        assert!(config.validate().is_err());
    }
}
