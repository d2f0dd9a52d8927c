//! Paginated fetcher
//!
//! Walks an endpoint page by page under the error policy. The position in
//! `SyncState` is advanced only after a page has been fetched and decoded,
//! so every retry re-issues the identical request. Each request is retried
//! at most `RetryPolicy::max_attempts` times, and every wait can be
//! interrupted through the cancellation token.

use super::types::{NextPage, Paginator};
use crate::auth::AuthRefresher;
use crate::error::{Error, Result};
use crate::http::{Action, ErrorPolicy, HttpClient, Outcome, RequestConfig, RetryPolicy, RetryReason};
use crate::template::{render, TemplateContext};
use crate::types::{JsonValue, RecordId};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Items returned by a detail fetch
#[derive(Debug, Default)]
pub struct DetailBatch {
    /// Detail bodies in request order
    pub items: Vec<JsonValue>,
    /// Identifiers that no longer exist upstream
    pub not_found: Vec<RecordId>,
}

/// Fetches list pages and per-record details for one source
pub struct PaginatedFetcher {
    http: Arc<HttpClient>,
    auth: Option<Arc<AuthRefresher>>,
    error_policy: ErrorPolicy,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl PaginatedFetcher {
    /// Create a fetcher without authentication
    pub fn new(http: Arc<HttpClient>, error_policy: ErrorPolicy, retry: RetryPolicy) -> Self {
        Self {
            http,
            auth: None,
            error_policy,
            retry,
            cancel: CancellationToken::new(),
        }
    }

    /// Authenticate requests with the source's credential
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<AuthRefresher>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Abort waits and requests when this token is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch every page of a list endpoint.
    ///
    /// `params` are sent with every page, next to the paginator's own.
    pub async fn fetch_all(
        &self,
        path: &str,
        params: &[(String, String)],
        paginator: &dyn Paginator,
    ) -> Result<Vec<JsonValue>> {
        let mut state = paginator.initial_state();
        let mut records = Vec::new();

        loop {
            let mut query = params.to_vec();
            query.extend(paginator.request_params(&state));
            let what = format!("{path} ({})", state.describe());

            let body = match self.request_json(path, &query, &what).await? {
                Some(body) => body,
                // A missing page cannot be skipped without losing data
                None => return Err(Error::upstream(404, format!("{what} not found"))),
            };

            let items = paginator.extract_items(&body)?;
            let count = items.len();
            records.extend(items);
            debug!("Fetched {what}: {count} items");

            if paginator.advance(&body, count, &mut state) == NextPage::Done {
                break;
            }
        }

        info!(
            path,
            pages = state.pages_fetched,
            records = records.len(),
            "Pagination complete"
        );
        Ok(records)
    }

    /// Fetch one detail record per identifier.
    ///
    /// `path_template` is rendered with `{{ id }}`. Identifiers that are gone
    /// upstream are logged and left out of the batch.
    pub async fn fetch_details(&self, path_template: &str, ids: &[RecordId]) -> Result<DetailBatch> {
        let mut batch = DetailBatch::default();

        for id in ids {
            let ctx = TemplateContext::new().with_vars(serde_json::json!({ "id": id.to_string() }));
            let path = render(path_template, &ctx)?;

            match self.request_json(&path, &[], &path).await? {
                Some(item) => batch.items.push(item),
                None => {
                    warn!(id = %id, path = %path, "Record not found upstream, skipping");
                    batch.not_found.push(id.clone());
                }
            }
        }

        info!(
            requested = ids.len(),
            fetched = batch.items.len(),
            not_found = batch.not_found.len(),
            "Detail fetch complete"
        );
        Ok(batch)
    }

    /// Issue one logical request, looping over retryable outcomes.
    /// Returns `None` when the policy says to skip the item.
    async fn request_json(
        &self,
        path: &str,
        query: &[(String, String)],
        what: &str,
    ) -> Result<Option<JsonValue>> {
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let outcome = self.attempt(path, query, attempts).await;
            attempts += 1;

            match outcome {
                Outcome::Success(body) => return Ok(Some(body)),
                Outcome::Skip => return Ok(None),
                Outcome::Fatal(e) => return Err(e),
                Outcome::Retry { delay, reason } => {
                    if !self.retry.allows_retry(attempts) {
                        return Err(match reason {
                            RetryReason::RateLimited => Error::RateLimited { attempts },
                            _ => Error::MaxRetriesExceeded {
                                max_attempts: attempts,
                                what: what.to_string(),
                            },
                        });
                    }
                    debug!(
                        "Retrying {what} ({reason:?}), attempt {}/{}",
                        attempts + 1,
                        self.retry.max_attempts
                    );
                    self.sleep(delay).await?;
                }
            }
        }
    }

    /// One attempt: send, then classify the response
    async fn attempt(
        &self,
        path: &str,
        query: &[(String, String)],
        attempt: u32,
    ) -> Outcome<JsonValue> {
        let token = match &self.auth {
            Some(auth) => match auth.ensure_fresh().await {
                Ok(token) => Some(token),
                Err(e) => return Outcome::Fatal(e),
            },
            None => None,
        };

        let mut config = RequestConfig::new().queries(query.iter().cloned());
        if let Some(ref token) = token {
            config = config.bearer(token);
        }

        let request = self.http.get(path, config);
        let response = tokio::select! {
            () = self.cancel.cancelled() => return Outcome::Fatal(Error::Cancelled),
            result = request => match result {
                Ok(response) => response,
                Err(e) => {
                    let delay = self.retry.backoff(attempt);
                    warn!("Request to {path} failed: {e}, retrying in {delay:?}");
                    return Outcome::Retry {
                        delay,
                        reason: RetryReason::Transport,
                    };
                }
            },
        };

        let status = response.status();
        if status.is_success() {
            return match response.json::<JsonValue>().await {
                Ok(body) => Outcome::Success(body),
                Err(e) => Outcome::Fatal(Error::decode(format!("{path}: {e}"))),
            };
        }

        let action = self
            .error_policy
            .handle(status, token.as_deref(), self.auth.as_deref())
            .await;
        match action {
            Ok(Action::SleepAndRetry(delay)) => Outcome::Retry {
                delay,
                reason: RetryReason::RateLimited,
            },
            Ok(Action::RefreshAndRetry) => Outcome::Retry {
                delay: Duration::ZERO,
                reason: RetryReason::Refreshed,
            },
            Ok(Action::Skip) => Outcome::Skip,
            Ok(Action::Fatal) => {
                let body = response.text().await.unwrap_or_default();
                Outcome::Fatal(Error::upstream(status.as_u16(), body))
            }
            Err(e) => Outcome::Fatal(e),
        }
    }

    /// Sleep unless cancelled first
    async fn sleep(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            () = self.cancel.cancelled() => Err(Error::Cancelled),
            () = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

impl std::fmt::Debug for PaginatedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedFetcher")
            .field("http", &self.http)
            .field("has_auth", &self.auth.is_some())
            .field("error_policy", &self.error_policy)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
