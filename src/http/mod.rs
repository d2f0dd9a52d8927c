//! HTTP client module
//!
//! Single-attempt HTTP client, the status classification policy and the
//! retry bound that callers loop under.
//!
//! # Features
//!
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Error Policy**: 429 sleeps, 401 refreshes, 404 skips, the rest is fatal
//! - **Retry Policy**: Bounded attempts with constant, linear or exponential backoff

mod client;
mod policy;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig};
pub use policy::{
    Action, ErrorPolicy, Outcome, RetryPolicy, RetryReason, DEFAULT_RATE_LIMIT_DELAY,
};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
