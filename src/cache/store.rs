//! Identifier store implementation
//!
//! Provides file-based identifier persistence with atomic writes.

use super::types::IdentifierSets;
use crate::error::{Error, Result};
use crate::types::RecordId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Durable set store addressed by cache key
#[async_trait]
pub trait IdentifierStore: Send + Sync {
    /// All identifiers stored under `key` (empty if the key is unseen)
    async fn get_known_ids(&self, key: &str) -> Result<HashSet<RecordId>>;

    /// Union `ids` into the set under `key`; returns how many were new
    async fn add_ids(&self, key: &str, ids: &[RecordId]) -> Result<usize>;
}

/// Identifier sets kept in a JSON file
#[derive(Debug)]
pub struct FileIdentifierStore {
    /// Path to the cache file (empty in memory mode)
    path: PathBuf,
    /// Current sets (cached)
    sets: RwLock<IdentifierSets>,
}

impl FileIdentifierStore {
    /// Open a store, loading existing sets if the file is present
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let sets = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                Error::identifier_cache(format!("Failed to read {}: {e}", path.display()))
            })?;
            serde_json::from_str(&contents).map_err(|e| {
                Error::identifier_cache(format!("Failed to parse {}: {e}", path.display()))
            })?
        } else {
            IdentifierSets::new()
        };

        Ok(Self {
            path,
            sets: RwLock::new(sets),
        })
    }

    /// Create an in-memory store (no file persistence)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            sets: RwLock::new(IdentifierSets::new()),
        }
    }

    /// Check if this is an in-memory store
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }

    /// Path to the cache file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of identifiers stored under `key`
    pub async fn count(&self, key: &str) -> usize {
        self.sets.read().await.len(key)
    }

    async fn save(&self, sets: &IdentifierSets) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let contents = serde_json::to_string_pretty(sets)
            .map_err(|e| Error::identifier_cache(format!("Failed to serialize cache: {e}")))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::identifier_cache(format!("Failed to write cache file: {e}")))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::identifier_cache(format!("Failed to rename cache file: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl IdentifierStore for FileIdentifierStore {
    async fn get_known_ids(&self, key: &str) -> Result<HashSet<RecordId>> {
        Ok(self.sets.read().await.members(key))
    }

    async fn add_ids(&self, key: &str, ids: &[RecordId]) -> Result<usize> {
        // Hold the write lock across the save so concurrent adds serialize
        let mut sets = self.sets.write().await;
        let added = sets.add(key, ids);
        if added > 0 {
            self.save(&sets).await?;
        }
        debug!(key, added, "Added identifiers to cache");
        Ok(added)
    }
}
