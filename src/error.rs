//! Error types for pulse-etl
//!
//! This module defines the error hierarchy for the whole pipeline.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Recoverable upstream conditions (rate limits, a deleted record, one bad
//! row during an upsert) are absorbed where they happen and only show up in
//! logs and counters. The variants below are what escapes a layer.

use thiserror::Error;

/// The main error type for pulse-etl
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Unknown endpoint '{endpoint}' for source '{source_name}'")]
    UnknownEndpoint {
        source_name: String,
        endpoint: String,
    },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Token refresh failed with HTTP {status}: {body}")]
    Auth { status: u16, body: String },

    #[error("Credential store error: {message}")]
    Credentials { message: String },

    // ============================================================================
    // Upstream / HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Rate limited, giving up after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Record '{id}' not found upstream")]
    NotFound { id: String },

    #[error("Max retries ({max_attempts}) exceeded for {what}")]
    MaxRetriesExceeded { max_attempts: u32, what: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("Operation cancelled")]
    Cancelled,

    // ============================================================================
    // Persistence Errors
    // ============================================================================
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    #[error("Failed to persist record {key} into '{table}': {message}")]
    Persistence {
        table: String,
        key: String,
        message: String,
    },

    #[error("Identifier cache error: {message}")]
    IdentifierCache { message: String },

    #[error("Staging store error: {message}")]
    Staging { message: String },

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an auth error from a token endpoint response
    pub fn auth(status: u16, body: impl Into<String>) -> Self {
        Self::Auth {
            status,
            body: body.into(),
        }
    }

    /// Create a credential store error
    pub fn credentials(message: impl Into<String>) -> Self {
        Self::Credentials {
            message: message.into(),
        }
    }

    /// Create an upstream status error
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Create an identifier cache error
    pub fn identifier_cache(message: impl Into<String>) -> Self {
        Self::IdentifierCache {
            message: message.into(),
        }
    }

    /// Create a staging error
    pub fn staging(message: impl Into<String>) -> Self {
        Self::Staging {
            message: message.into(),
        }
    }

    /// Create a persistence error for one record
    pub fn persistence(
        table: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Persistence {
            table: table.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Whether this error terminates the current source's run.
    ///
    /// Not-found and single-record persistence failures are item level and
    /// never end a run; everything else that reaches the engine does.
    pub fn is_fatal_for_source(&self) -> bool {
        !matches!(self, Error::NotFound { .. } | Error::Persistence { .. })
    }

    /// Check if this error is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }
}

/// Result type alias for pulse-etl
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
