//! Sliding-window rate limiting per client IP, with burst/minute/hour tiers
//! and a loopback/RFC1918 whitelist.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::utils::config::RateLimitConfig;

const BURST_WINDOW: Duration = Duration::from_secs(10);
const MINUTE_WINDOW: Duration = Duration::from_secs(60);
const HOUR_WINDOW: Duration = Duration::from_secs(3600);

/// Which tier rejected a request, used to shape the `Retry-After` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitTier {
    Burst,
    Minute,
    Hour,
}

#[derive(Debug)]
pub struct RateLimitError {
    pub tier: RateLimitTier,
    pub retry_after_secs: u64,
}

impl std::fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rate limit exceeded ({:?} tier)", self.tier)
    }
}

impl std::error::Error for RateLimitError {}

#[derive(Debug, Default)]
struct ClientWindows {
    burst: VecDeque<Instant>,
    minute: VecDeque<Instant>,
    hour: VecDeque<Instant>,
}

/// Sliding-window limiter keyed by client IP string.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Arc<RwLock<HashMap<String, ClientWindows>>>,
    whitelist: Vec<ipnetwork_lite::Cidr>,
}

mod ipnetwork_lite {
    use std::net::IpAddr;

    /// A tiny CIDR matcher, enough for the loopback/RFC1918 whitelist
    /// this system needs without pulling in a full IP-address crate.
    #[derive(Debug, Clone)]
    pub struct Cidr {
        network: IpAddr,
        prefix_len: u8,
    }

    impl Cidr {
        pub fn parse(s: &str) -> Option<Self> {
            let (addr, len) = s.split_once('/')?;
            let network: IpAddr = addr.parse().ok()?;
            let prefix_len: u8 = len.parse().ok()?;
            Some(Self {
                network,
                prefix_len,
            })
        }

        pub fn contains(&self, ip: &IpAddr) -> bool {
            match (self.network, ip) {
                (IpAddr::V4(net), IpAddr::V4(addr)) => {
                    let net_bits = u32::from(net);
                    let addr_bits = u32::from(*addr);
                    let shift = 32u32.saturating_sub(u32::from(self.prefix_len));
                    let mask = if shift >= 32 { 0 } else { !0u32 << shift };
                    (net_bits & mask) == (addr_bits & mask)
                }
                (IpAddr::V6(net), IpAddr::V6(addr)) => {
                    let net_bits = u128::from(net);
                    let addr_bits = u128::from(*addr);
                    let shift = 128u32.saturating_sub(u32::from(self.prefix_len));
                    let mask = if shift >= 128 { 0 } else { !0u128 << shift };
                    (net_bits & mask) == (addr_bits & mask)
                }
                _ => false,
            }
        }
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let whitelist = config
            .whitelist_cidrs
            .iter()
            .filter_map(|s| ipnetwork_lite::Cidr::parse(s))
            .collect();
        Self {
            config,
            clients: Arc::new(RwLock::new(HashMap::new())),
            whitelist,
        }
    }

    /// True when the IP is loopback, an RFC1918 private range, or listed in
    /// the configured whitelist CIDRs.
    #[must_use]
    pub fn is_whitelisted(&self, ip: &IpAddr) -> bool {
        if ip.is_loopback() {
            return true;
        }
        if let IpAddr::V4(v4) = ip {
            if v4.is_private() {
                return true;
            }
        }
        self.whitelist.iter().any(|c| c.contains(ip))
    }

    /// Record a request from `client_ip` and check all three tiers.
    pub async fn check(&self, client_ip: &str, ip: IpAddr) -> Result<(), RateLimitError> {
        if self.is_whitelisted(&ip) {
            return Ok(());
        }
        let now = Instant::now();
        let mut clients = self.clients.write().await;
        let windows = clients.entry(client_ip.to_string()).or_default();

        prune(&mut windows.burst, now, BURST_WINDOW);
        prune(&mut windows.minute, now, MINUTE_WINDOW);
        prune(&mut windows.hour, now, HOUR_WINDOW);

        if windows.burst.len() as u32 >= self.config.burst_limit {
            return Err(RateLimitError {
                tier: RateLimitTier::Burst,
                retry_after_secs: BURST_WINDOW.as_secs(),
            });
        }
        if windows.minute.len() as u32 >= self.config.requests_per_minute {
            return Err(RateLimitError {
                tier: RateLimitTier::Minute,
                retry_after_secs: MINUTE_WINDOW.as_secs(),
            });
        }
        if windows.hour.len() as u32 >= self.config.requests_per_hour {
            return Err(RateLimitError {
                tier: RateLimitTier::Hour,
                retry_after_secs: HOUR_WINDOW.as_secs(),
            });
        }

        windows.burst.push_back(now);
        windows.minute.push_back(now);
        windows.hour.push_back(now);
        Ok(())
    }

    /// Periodically drop clients with no activity in the last hour, so the
    /// map doesn't grow unbounded across a long-running process.
    pub async fn start_cleanup_task(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            let now = Instant::now();
            let mut clients = self.clients.write().await;
            clients.retain(|_, w| {
                w.hour.back().is_some_and(|t| now.duration_since(*t) < HOUR_WINDOW)
            });
        }
    }
}

fn prune(window: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(front) = window.front() {
        if now.duration_since(*front) >= span {
            window.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            burst_limit: 2,
            requests_per_minute: 100,
            requests_per_hour: 1000,
            whitelist_cidrs: vec![],
        }
    }

    #[tokio::test]
    async fn allows_under_burst_limit() {
        let limiter = RateLimiter::new(config());
        let ip: IpAddr = "203.0.113.5".parse().unwrap();
        assert!(limiter.check("203.0.113.5", ip).await.is_ok());
        assert!(limiter.check("203.0.113.5", ip).await.is_ok());
    }

    #[tokio::test]
    async fn rejects_over_burst_limit() {
        let limiter = RateLimiter::new(config());
        let ip: IpAddr = "203.0.113.5".parse().unwrap();
        limiter.check("203.0.113.5", ip).await.unwrap();
        limiter.check("203.0.113.5", ip).await.unwrap();
        let err = limiter.check("203.0.113.5", ip).await.unwrap_err();
        assert_eq!(err.tier, RateLimitTier::Burst);
    }

    #[tokio::test]
    async fn whitelists_loopback() {
        let limiter = RateLimiter::new(config());
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.check("127.0.0.1", ip).await.is_ok());
        }
    }

    #[tokio::test]
    async fn whitelists_private_range() {
        let limiter = RateLimiter::new(config());
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.check("10.0.0.5", ip).await.is_ok());
        }
    }
}
