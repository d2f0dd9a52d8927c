//! Error and retry policies
//!
//! `ErrorPolicy` maps a failed status onto an [`Action`]. Its only side
//! effect is triggering a token refresh for `401`; it never re-issues the
//! request itself. `RetryPolicy` bounds how often a caller may loop and how
//! long it waits between transport failures.

use crate::auth::AuthRefresher;
use crate::error::{Error, Result};
use crate::types::BackoffType;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{info, warn};

/// Default wait after a rate-limited response (15 minutes)
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(900);

/// What the caller should do about a failed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Sleep for the given delay, then re-issue the identical request
    SleepAndRetry(Duration),
    /// Refresh the credential, then re-issue the request
    RefreshAndRetry,
    /// Drop this one item and continue
    Skip,
    /// Abort the run for this source
    Fatal,
}

/// Result of one attempt at a request
#[derive(Debug)]
pub enum Outcome<T> {
    /// The request succeeded
    Success(T),
    /// Try again after the delay
    Retry {
        /// How long to wait first
        delay: Duration,
        /// Why the attempt failed
        reason: RetryReason,
    },
    /// The item is gone upstream
    Skip,
    /// Give up
    Fatal(Error),
}

/// Why an attempt is being retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// Upstream answered 429
    RateLimited,
    /// The credential was refreshed after a 401
    Refreshed,
    /// Connection error or timeout
    Transport,
}

/// Classifies failed statuses and performs the refresh side effect
#[derive(Debug, Clone)]
pub struct ErrorPolicy {
    rate_limit_delay: Duration,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_DELAY)
    }
}

impl ErrorPolicy {
    /// Create a policy with the given rate-limit delay
    pub fn new(rate_limit_delay: Duration) -> Self {
        Self { rate_limit_delay }
    }

    /// Configured rate-limit delay
    pub fn rate_limit_delay(&self) -> Duration {
        self.rate_limit_delay
    }

    /// Pure classification of a non-success status
    pub fn classify(&self, status: StatusCode) -> Action {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Action::SleepAndRetry(self.rate_limit_delay),
            StatusCode::UNAUTHORIZED => Action::RefreshAndRetry,
            StatusCode::NOT_FOUND => Action::Skip,
            _ => Action::Fatal,
        }
    }

    /// Classify a status and execute the refresh for `401`.
    ///
    /// `rejected_token` is the token the failed request carried. A failed
    /// refresh is returned as `Error::Auth`, which is fatal for the run.
    /// Without a refresher a `401` is fatal.
    pub async fn handle(
        &self,
        status: StatusCode,
        rejected_token: Option<&str>,
        refresher: Option<&AuthRefresher>,
    ) -> Result<Action> {
        let action = self.classify(status);
        match action {
            Action::SleepAndRetry(delay) => {
                warn!("Rate limited (429), sleeping {}s before retry", delay.as_secs());
                Ok(action)
            }
            Action::RefreshAndRetry => match (refresher, rejected_token) {
                (Some(refresher), Some(token)) => {
                    info!(source = refresher.source(), "Unauthorized (401), refreshing token");
                    refresher.refresh_rejected(token).await?;
                    Ok(action)
                }
                _ => Ok(Action::Fatal),
            },
            Action::Skip | Action::Fatal => Ok(action),
        }
    }
}

/// Bound on attempts per request plus the transport backoff schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts for one page or record (first try included)
    pub max_attempts: u32,
    /// Backoff strategy for transport failures
    pub backoff_type: BackoffType,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_type: BackoffType::Exponential,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Set the maximum attempts
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set backoff configuration
    #[must_use]
    pub fn with_backoff(mut self, backoff_type: BackoffType, initial: Duration, max: Duration) -> Self {
        self.backoff_type = backoff_type;
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Calculate backoff delay for a given attempt (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = match self.backoff_type {
            BackoffType::Constant => self.initial_backoff,
            BackoffType::Linear => self.initial_backoff * (attempt + 1),
            BackoffType::Exponential => {
                let factor = 2u32.saturating_pow(attempt);
                self.initial_backoff.saturating_mul(factor)
            }
        };

        std::cmp::min(delay, self.max_backoff)
    }
}
