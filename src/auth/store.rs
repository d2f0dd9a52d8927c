//! Durable credential storage
//!
//! The env-file store keeps `<PREFIX>_ACCESS_TOKEN`, `<PREFIX>_REFRESH_TOKEN`
//! and `<PREFIX>_TOKEN_EXPIRY` in a dotenv file and rewrites those keys in
//! place, leaving every other line untouched.

use super::types::CredentialState;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Durable home of one source's credential
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the stored credential
    async fn load(&self) -> Result<CredentialState>;

    /// Persist a refreshed credential
    async fn save(&self, state: &CredentialState) -> Result<()>;
}

/// Credential stored in a dotenv-style file
#[derive(Debug, Clone)]
pub struct EnvFileCredentialStore {
    path: PathBuf,
    prefix: String,
}

impl EnvFileCredentialStore {
    /// Create a store for keys with the given prefix (e.g. `STRAVA`)
    pub fn new(path: impl AsRef<Path>, prefix: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            prefix: prefix.into().to_uppercase(),
        }
    }

    /// Path of the env file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}_{suffix}", self.prefix)
    }

    fn read_vars(&self) -> Result<HashMap<String, String>> {
        let iter = dotenvy::from_path_iter(&self.path).map_err(|e| {
            Error::credentials(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        let mut vars = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                Error::credentials(format!("Failed to parse {}: {e}", self.path.display()))
            })?;
            vars.insert(key, value);
        }
        Ok(vars)
    }
}

#[async_trait]
impl CredentialStore for EnvFileCredentialStore {
    async fn load(&self) -> Result<CredentialState> {
        let vars = self.read_vars()?;

        let access_key = self.key("ACCESS_TOKEN");
        let refresh_key = self.key("REFRESH_TOKEN");
        let access_token = vars
            .get(&access_key)
            .cloned()
            .ok_or_else(|| Error::credentials(format!("{access_key} is not set")))?;
        let refresh_token = vars
            .get(&refresh_key)
            .cloned()
            .ok_or_else(|| Error::credentials(format!("{refresh_key} is not set")))?;

        let expiry = vars
            .get(&self.key("TOKEN_EXPIRY"))
            .filter(|v| !v.is_empty())
            .map(|v| parse_expiry(v))
            .transpose()?;

        Ok(CredentialState {
            access_token,
            refresh_token,
            expiry,
        })
    }

    async fn save(&self, state: &CredentialState) -> Result<()> {
        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(Error::credentials(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };

        let mut updates = vec![
            (self.key("ACCESS_TOKEN"), state.access_token.clone()),
            (self.key("REFRESH_TOKEN"), state.refresh_token.clone()),
        ];
        if let Some(expiry) = state.expiry {
            updates.push((self.key("TOKEN_EXPIRY"), expiry.to_rfc3339()));
        }

        let contents = rewrite_env(&existing, &updates);

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, contents)
            .await
            .map_err(|e| Error::credentials(format!("Failed to write credentials: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::credentials(format!("Failed to replace credentials: {e}")))?;

        Ok(())
    }
}

/// Replace `KEY=...` lines for the given keys, appending keys not present
fn rewrite_env(existing: &str, updates: &[(String, String)]) -> String {
    let mut written = vec![false; updates.len()];
    let mut lines: Vec<String> = existing
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            let assignment = trimmed.strip_prefix("export ").unwrap_or(trimmed);
            let key = assignment.split('=').next().unwrap_or("").trim();
            match updates.iter().position(|(k, _)| k == key) {
                Some(i) if assignment.contains('=') => {
                    written[i] = true;
                    format!("{key}={}", quote_value(&updates[i].1))
                }
                _ => line.to_string(),
            }
        })
        .collect();

    for (i, (key, value)) in updates.iter().enumerate() {
        if !written[i] {
            lines.push(format!("{key}={}", quote_value(value)));
        }
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn quote_value(value: &str) -> String {
    if value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$'))
    {
        let mut quoted = String::with_capacity(value.len() + 2);
        quoted.push('"');
        for c in value.chars() {
            match c {
                // `$` would otherwise be expanded as a variable on load
                '\\' | '"' | '$' => {
                    quoted.push('\\');
                    quoted.push(c);
                }
                '\n' => quoted.push_str("\\n"),
                _ => quoted.push(c),
            }
        }
        quoted.push('"');
        quoted
    } else {
        value.to_string()
    }
}

fn parse_expiry(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(secs) = value.trim().parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| Error::credentials(format!("Invalid token expiry: {value}")));
    }
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| Error::credentials(format!("Invalid token expiry '{value}': {e}")))
}

/// Credential held in memory (tests and one-off runs)
#[derive(Debug)]
pub struct MemoryCredentialStore {
    state: Mutex<CredentialState>,
    saves: AtomicUsize,
}

impl MemoryCredentialStore {
    /// Create a store seeded with a credential
    pub fn new(state: CredentialState) -> Self {
        Self {
            state: Mutex::new(state),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of times `save` was called
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Currently stored credential
    pub fn snapshot(&self) -> CredentialState {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> Result<CredentialState> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &CredentialState) -> Result<()> {
        *self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = state.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
