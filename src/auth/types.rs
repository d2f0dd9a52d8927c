//! Credential types
//!
//! One `CredentialState` exists per external source. It is replaced as a
//! whole on refresh; no history of previous access tokens is kept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Seconds before expiry at which a token is already treated as expired
const EXPIRY_BUFFER_SECONDS: i64 = 30;

/// Bearer credential and its refresh material for one source
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialState {
    /// Current access token
    pub access_token: String,
    /// Refresh token exchanged for new access tokens
    pub refresh_token: String,
    /// When the access token expires, if known
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
}

impl CredentialState {
    /// Create a credential without a known expiry
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expiry: None,
        }
    }

    /// Set the expiry
    #[must_use]
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Check if the access token is expired (with 30 second buffer)
    pub fn is_expired(&self) -> bool {
        match self.expiry {
            Some(expiry) => {
                let buffer = chrono::Duration::seconds(EXPIRY_BUFFER_SECONDS);
                Utc::now() + buffer >= expiry
            }
            None => false,
        }
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialState")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("expiry", &self.expiry)
            .finish()
    }
}

fn redact(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    format!("{visible}****")
}

/// OAuth2 client registration used against a source's token endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthClient {
    /// Token endpoint URL
    pub token_url: String,
    /// Client ID
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

impl OAuthClient {
    /// Create a new client registration
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod type_tests {
    use super::*;

    #[test]
    fn test_credential_not_expired() {
        let cred = CredentialState::new("a", "r").with_expiry(Utc::now() + chrono::Duration::hours(1));
        assert!(!cred.is_expired());
    }

    #[test]
    fn test_credential_expired_within_buffer() {
        let cred =
            CredentialState::new("a", "r").with_expiry(Utc::now() + chrono::Duration::seconds(10));
        assert!(cred.is_expired());
    }

    #[test]
    fn test_credential_no_expiry() {
        assert!(!CredentialState::new("a", "r").is_expired());
    }

    #[test]
    fn test_authorization_header() {
        assert_eq!(
            CredentialState::new("tok", "r").authorization_header(),
            "Bearer tok"
        );
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let debug = format!("{:?}", CredentialState::new("secret-access", "secret-refresh"));
        assert!(!debug.contains("secret-access"));
        assert!(debug.contains("secr****"));
    }
}
