//! Access token refresher
//!
//! Exchanges the refresh token for a new access token and persists the
//! result. Concurrent callers that saw the same rejected token share one
//! refresh: the first one through the lock calls the token endpoint, the
//! rest find the token already replaced and reuse it.

use super::store::CredentialStore;
use super::types::{CredentialState, OAuthClient};
use crate::error::{Error, Result};
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Refreshes and hands out the bearer credential of one source
pub struct AuthRefresher {
    source: String,
    client: OAuthClient,
    state: RwLock<CredentialState>,
    refresh_lock: Mutex<()>,
    store: Arc<dyn CredentialStore>,
    http_client: Client,
}

impl AuthRefresher {
    /// Create a refresher seeded with a known credential
    pub fn new(
        source: impl Into<String>,
        client: OAuthClient,
        initial: CredentialState,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            source: source.into(),
            client,
            state: RwLock::new(initial),
            refresh_lock: Mutex::new(()),
            store,
            http_client: Client::new(),
        }
    }

    /// Create a refresher from the credential currently in the store
    pub async fn load(
        source: impl Into<String>,
        client: OAuthClient,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self> {
        let initial = store.load().await?;
        Ok(Self::new(source, client, initial, store))
    }

    /// Use a custom HTTP client for token requests
    #[must_use]
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Source this credential belongs to
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Snapshot of the current credential
    pub async fn current(&self) -> CredentialState {
        self.state.read().await.clone()
    }

    /// Current access token
    pub async fn access_token(&self) -> String {
        self.state.read().await.access_token.clone()
    }

    /// Access token, refreshed first when it is known to be expired
    pub async fn ensure_fresh(&self) -> Result<String> {
        {
            let state = self.state.read().await;
            if !state.is_expired() {
                return Ok(state.access_token.clone());
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // Double-check after acquiring the lock (another task might have refreshed)
        {
            let state = self.state.read().await;
            if !state.is_expired() {
                return Ok(state.access_token.clone());
            }
        }

        debug!(source = %self.source, "Access token expired, refreshing");
        self.fetch_and_store().await
    }

    /// Refresh after the upstream rejected `rejected_token`.
    ///
    /// If another task already replaced that token, the replacement is
    /// returned without contacting the token endpoint again.
    pub async fn refresh_rejected(&self, rejected_token: &str) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        {
            let state = self.state.read().await;
            if state.access_token != rejected_token {
                debug!(source = %self.source, "Token already refreshed by another request");
                return Ok(state.access_token.clone());
            }
        }

        self.fetch_and_store().await
    }

    /// Refresh unconditionally
    pub async fn refresh(&self) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_store().await
    }

    /// Call the token endpoint, then replace and persist the credential.
    /// Must be called with `refresh_lock` held.
    async fn fetch_and_store(&self) -> Result<String> {
        let refresh_token = self.state.read().await.refresh_token.clone();

        let form = [
            ("client_id", self.client.client_id.as_str()),
            ("client_secret", self.client.client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .http_client
            .post(&self.client.token_url)
            .form(&form)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(source = %self.source, status, "Token refresh rejected");
            return Err(Error::auth(status, body));
        }

        let token_response: TokenResponse = response.json().await.map_err(Error::Http)?;
        let new_state = token_response.into_state(refresh_token);
        let access_token = new_state.access_token.clone();

        *self.state.write().await = new_state.clone();
        self.store.save(&new_state).await?;

        info!(source = %self.source, expiry = ?new_state.expiry, "Refreshed access token");
        Ok(access_token)
    }
}

impl std::fmt::Debug for AuthRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthRefresher")
            .field("source", &self.source)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

/// OAuth2 token response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Present only when the provider rotates refresh tokens
    #[serde(default)]
    refresh_token: Option<String>,
    /// Absolute expiry in epoch seconds
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_state(self, previous_refresh_token: String) -> CredentialState {
        let expiry = self
            .expires_at
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .or_else(|| {
                self.expires_in
                    .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
            });

        CredentialState {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or(previous_refresh_token),
            expiry,
        }
    }
}
