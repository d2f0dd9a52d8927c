//! Configuration types for pipeline definitions
//!
//! This module contains the structures that describe a pipeline in YAML:
//! where the database, identifier cache and staging store live, how the
//! HTTP layer retries, and which sources are synced.
//!
//! String values may reference the environment as `{{ env.NAME }}`. A
//! `.env` file next to the working directory is loaded first if present.

use crate::endpoint::{Endpoint, EndpointRegistry};
use crate::error::{Error, Result};
use crate::http::{ErrorPolicy, HttpClientConfig, RateLimiterConfig, RetryPolicy};
use crate::schema::TableSchema;
use crate::template::{render_env_value, TemplateContext};
use crate::types::BackoffType;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// Top-Level Pipeline Config
// ============================================================================

/// Complete pipeline configuration loaded from YAML
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Relational store
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Identifier cache
    #[serde(default)]
    pub identifier_cache: IdentifierCacheConfig,

    /// Staging store
    #[serde(default)]
    pub staging: StagingConfig,

    /// HTTP client configuration
    #[serde(default)]
    pub http: HttpConfig,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Source definitions
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl PipelineConfig {
    /// Load a pipeline file, resolving placeholders from the environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match dotenvy::dotenv() {
            Ok(env_path) => debug!("Loaded environment from {}", env_path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::config(format!("Failed to load .env: {e}"))),
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read pipeline file '{}': {e}",
                path.display()
            ))
        })?;
        Self::from_yaml_str(&content, &TemplateContext::from_env())
    }

    /// Parse a pipeline definition from a YAML string
    pub fn from_yaml_str(yaml: &str, ctx: &TemplateContext) -> Result<Self> {
        let raw: serde_json::Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse pipeline YAML: {e}")))?;
        let rendered = render_env_value(&raw, ctx)?;
        let config: Self = serde_json::from_value(rendered)
            .map_err(|e| Error::config(format!("Invalid pipeline definition: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Check cross-references between sections
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            return Err(Error::config("Pipeline must have at least one source"));
        }

        let names: HashSet<_> = self.sources.iter().map(|s| &s.name).collect();
        if names.len() != self.sources.len() {
            return Err(Error::config("Duplicate source names found"));
        }

        let mut cache_keys = HashSet::new();
        for source in &self.sources {
            source.validate()?;
            let key = source.cache_key();
            if !cache_keys.insert(key.clone()) {
                return Err(Error::config(format!(
                    "Source '{}' shares identifier cache key '{key}' with another source",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Look up a source by name
    pub fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::config(format!("Unknown source '{name}'")))
    }
}

// ============================================================================
// Stores
// ============================================================================

/// Relational store location
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

fn default_database_path() -> String {
    "data/pulse.duckdb".to_string()
}

/// Identifier cache location
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentifierCacheConfig {
    /// JSON file holding the sets (in memory when absent)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Staging store location
#[derive(Debug, Clone, Deserialize)]
pub struct StagingConfig {
    /// `s3://`, `r2://`, `gs://`, `az://`, `memory://` or a local directory
    #[serde(default = "default_staging_url")]
    pub url: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            url: default_staging_url(),
        }
    }
}

fn default_staging_url() -> String {
    "data/staging".to_string()
}

// ============================================================================
// HTTP Config
// ============================================================================

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Client-side rate limit (`null` disables it)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<RateLimiterConfig>,

    /// Headers sent with every request
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            rate_limit: default_rate_limit(),
            headers: BTreeMap::new(),
        }
    }
}

impl HttpConfig {
    /// Client configuration for one source
    pub fn client_config(&self, base_url: &str) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .base_url(base_url)
            .timeout(Duration::from_secs(self.timeout_seconds));
        builder = match &self.rate_limit {
            Some(limit) => builder.rate_limit(limit.clone()),
            None => builder.no_rate_limit(),
        };
        for (key, value) in &self.headers {
            builder = builder.header(key, value);
        }
        builder.build()
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_rate_limit() -> Option<RateLimiterConfig> {
    Some(RateLimiterConfig::default())
}

// ============================================================================
// Retry Config
// ============================================================================

/// Retry and rate-limit wait configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per page or record
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Wait after a 429, in seconds
    #[serde(default = "default_rate_limit_delay")]
    pub rate_limit_delay_secs: u64,

    /// Backoff between transport failures
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            rate_limit_delay_secs: default_rate_limit_delay(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryConfig {
    pub fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::new(Duration::from_secs(self.rate_limit_delay_secs))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_backoff(
                self.backoff.backoff_type,
                Duration::from_millis(self.backoff.initial_ms),
                Duration::from_millis(self.backoff.max_ms),
            )
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_rate_limit_delay() -> u64 {
    900
}

/// Backoff configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    /// Type of backoff
    #[serde(rename = "type", default)]
    pub backoff_type: BackoffType,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_type: BackoffType::Exponential,
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
        }
    }
}

fn default_initial_ms() -> u64 {
    500
}

fn default_max_ms() -> u64 {
    60000
}

// ============================================================================
// Source Config
// ============================================================================

/// One upstream source and the table it feeds
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Unique source name
    pub name: String,

    /// Base URL for API requests
    pub base_url: String,

    /// OAuth2 refresh-token authentication (public API when absent)
    #[serde(default)]
    pub auth: Option<AuthConfig>,

    /// Named endpoints
    pub endpoints: BTreeMap<String, Endpoint>,

    /// Endpoint listing all records
    pub list_endpoint: String,

    /// Endpoint returning one record by id; list items are stored as-is
    /// when absent
    #[serde(default)]
    pub detail_endpoint: Option<String>,

    /// Path of the identifier in a list item
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Identifier cache key (default `<name>_ids`)
    #[serde(default)]
    pub cache_key: Option<String>,

    /// Target table
    pub table: TableSchema,
}

impl SourceConfig {
    /// Endpoint lookup table of this source
    pub fn registry(&self) -> EndpointRegistry {
        EndpointRegistry::new(&self.name, self.endpoints.clone())
    }

    /// Identifier cache key
    pub fn cache_key(&self) -> String {
        self.cache_key
            .clone()
            .unwrap_or_else(|| format!("{}_ids", self.name))
    }

    fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::config("Source name cannot be empty"));
        }
        if self.base_url.is_empty() {
            return Err(Error::config(format!(
                "Source '{}' base_url cannot be empty",
                self.name
            )));
        }
        url::Url::parse(&self.base_url)?;
        if let Some(ref auth) = self.auth {
            url::Url::parse(&auth.token_url)?;
            if auth.client_id.is_empty() {
                return Err(Error::missing_field("auth.client_id"));
            }
            if auth.client_secret.is_empty() {
                return Err(Error::missing_field("auth.client_secret"));
            }
        }

        let registry = self.registry();
        registry.validate()?;
        registry.list(&self.list_endpoint)?;
        if let Some(ref detail) = self.detail_endpoint {
            registry.detail(detail)?;
        }

        self.table.validate()
    }
}

fn default_id_field() -> String {
    "id".to_string()
}

/// OAuth2 refresh-token configuration of a source
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Token endpoint URL
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Env file holding the access and refresh tokens
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    /// Prefix of the token keys in that file (default: source name)
    #[serde(default)]
    pub key_prefix: Option<String>,
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from(".env")
}

impl AuthConfig {
    /// Key prefix for a source
    pub fn key_prefix(&self, source: &str) -> String {
        self.key_prefix
            .clone()
            .unwrap_or_else(|| source.to_string())
            .to_uppercase()
    }
}
