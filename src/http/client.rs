//! HTTP client with rate limiting
//!
//! Issues exactly one request per call and hands back the response whatever
//! its status. Deciding what a non-success status means is the job of the
//! `ErrorPolicy`; looping is the job of the caller.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::error::{Error, Result};
use reqwest::{Client, Response};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Settings of one source's HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix of every relative request path
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// Proactive token bucket; `None` sends as fast as the upstream answers
    pub rate_limit: Option<RateLimiterConfig>,
    /// Headers sent with every request
    pub default_headers: BTreeMap<String, String>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers: BTreeMap::new(),
            user_agent: format!("pulse-etl/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`]
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Send this header with every request
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Per-request additions: query, headers and credential
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters, sent in insertion order
    pub query: Vec<(String, String)>,
    pub headers: BTreeMap<String, String>,
    /// Bearer token for the `Authorization` header
    pub bearer: Option<String>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn queries<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// Single-attempt HTTP client bound to one source
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(Error::Http)?;
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }

    /// Send one `GET`, waiting for the rate limiter first.
    ///
    /// Only transport failures are errors; any HTTP status is returned as is.
    pub async fn get(&self, path: &str, request: RequestConfig) -> Result<Response> {
        let url = self.build_url(path);

        if let Some(ref limiter) = self.rate_limiter {
            limiter.wait().await;
        }

        let mut builder = self.client.get(&url);
        for (key, value) in self.config.default_headers.iter().chain(&request.headers) {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        let response = builder.send().await.map_err(Error::Http)?;
        debug!(url = %url, status = response.status().as_u16(), "GET");
        Ok(response)
    }

    /// Join a relative path onto the base URL; absolute URLs pass through
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.config.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url)
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}
