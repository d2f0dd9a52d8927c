//! Client-side rate limiting
//!
//! A `governor` token bucket that paces requests before they are sent, so
//! the reactive 429 handling is the exception rather than the rule.

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Token bucket size and refill rate of one source
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimiterConfig {
    /// Sustained requests per second
    #[serde(default = "default_rps")]
    pub requests_per_second: u32,
    /// Requests allowed back to back after an idle period
    #[serde(default = "default_rps")]
    pub burst_size: u32,
}

fn default_rps() -> u32 {
    10
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            burst_size: default_rps(),
        }
    }
}

impl RateLimiterConfig {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }
}

/// Token bucket rate limiter, shared by clones
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>>,
}

impl RateLimiter {
    /// Build the bucket; zero values are clamped to one
    pub fn new(config: &RateLimiterConfig) -> Self {
        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: Arc::new(Governor::direct(quota)),
        }
    }

    /// Block until the bucket yields a permit
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish()
    }
}

#[cfg(test)]
mod rate_limit_tests {
    use super::*;

    #[test]
    fn test_rate_limiter_config_default() {
        let config = RateLimiterConfig::default();
        assert_eq!(config.requests_per_second, 10);
        assert_eq!(config.burst_size, 10);
    }

    #[test]
    fn test_rate_limiter_config_yaml_defaults() {
        let config: RateLimiterConfig = serde_yaml::from_str("requests_per_second: 2").unwrap();
        assert_eq!(config, RateLimiterConfig::new(2, 10));
    }

    #[tokio::test]
    async fn test_rate_limiter_exhausts_burst() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(1, 3));

        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        assert!(!limiter.try_acquire());
    }

    #[tokio::test]
    async fn test_rate_limiter_zero_is_clamped() {
        let limiter = RateLimiter::new(&RateLimiterConfig::new(0, 0));
        limiter.wait().await;
    }
}
