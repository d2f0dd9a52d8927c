//! Staging store support (S3, R2, GCS, Azure, local, memory)

use crate::error::{Error, Result};
use crate::schema::TableSchema;
use crate::types::{Record, Table};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, info};

/// Object key of a source's staged snapshot
///
/// Format: `{source}/staged.json`
pub fn staged_key(source: &str) -> String {
    let sanitized = source.replace('.', "_");
    format!("{sanitized}/staged.json")
}

/// Where staged snapshots live, parsed from a URL
#[derive(Debug, Clone)]
pub struct StagingStore {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Base path prefix within the bucket/container
    prefix: String,
    /// Original URL scheme for logging
    scheme: String,
}

impl StagingStore {
    /// Parse a staging URL and create the matching object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3
    /// - `r2://bucket/path/` - Cloudflare R2 (S3-compatible)
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `memory://` - process memory, lost on exit
    /// - `/local/path/` or `./path/` - Local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3(url, false)
        } else if url.starts_with("r2://") {
            Self::parse_s3(url, true)
        } else if url.starts_with("gs://") {
            Self::parse_gcs(url)
        } else if url.starts_with("az://") {
            Self::parse_azure(url)
        } else if url.starts_with("memory://") {
            Ok(Self::in_memory())
        } else {
            Self::parse_local(url)
        }
    }

    /// Staging store held in memory
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            prefix: String::new(),
            scheme: "memory".to_string(),
        }
    }

    fn split_bucket(rest: &str) -> (&str, String) {
        match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx + 1..].to_string()),
            None => (rest, String::new()),
        }
    }

    fn parse_s3(url: &str, is_r2: bool) -> Result<Self> {
        let scheme = if is_r2 { "r2" } else { "s3" };
        let rest = url
            .strip_prefix(&format!("{scheme}://"))
            .ok_or_else(|| Error::config(format!("Invalid {scheme} URL: {url}")))?;
        let (bucket, prefix) = Self::split_bucket(rest);

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        // R2 endpoint: https://<account_id>.r2.cloudflarestorage.com
        if is_r2 {
            if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                builder = builder.with_endpoint(endpoint);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create {scheme} client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: scheme.to_string(),
        })
    }

    fn parse_gcs(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("gs://")
            .ok_or_else(|| Error::config(format!("Invalid GCS URL: {url}")))?;
        let (bucket, prefix) = Self::split_bucket(rest);

        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "gs".to_string(),
        })
    }

    fn parse_azure(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("az://")
            .ok_or_else(|| Error::config(format!("Invalid Azure URL: {url}")))?;
        let (container, prefix) = Self::split_bucket(rest);

        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(container)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "az".to_string(),
        })
    }

    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: String::new(),
            scheme: "file".to_string(),
        })
    }

    /// Get the scheme (s3, r2, gs, az, memory, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Check if this is a remote store
    pub fn is_cloud(&self) -> bool {
        !matches!(self.scheme.as_str(), "file" | "memory")
    }

    fn object_path(&self, source: &str) -> ObjectPath {
        let key = staged_key(source);
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{key}", self.prefix.trim_end_matches('/')))
        }
    }

    /// Overwrite the staged snapshot of a source
    pub async fn put_table(&self, source: &str, table: &Table) -> Result<String> {
        let path = self.object_path(source);
        let data = serde_json::to_vec(table)?;

        self.store
            .put(&path, Bytes::from(data).into())
            .await
            .map_err(|e| Error::staging(format!("Failed to write {path}: {e}")))?;

        let full_path = format!("{}://{path}", self.scheme);
        debug!(source, rows = table.len(), path = %full_path, "Staged snapshot written");
        Ok(full_path)
    }

    /// Read the staged snapshot of a source, `None` if nothing was staged yet
    pub async fn get_table(&self, source: &str) -> Result<Option<Table>> {
        let path = self.object_path(source);
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(Error::staging(format!("Failed to read {path}: {e}"))),
        };

        let data = result
            .bytes()
            .await
            .map_err(|e| Error::staging(format!("Failed to read {path}: {e}")))?;
        let table = serde_json::from_slice(&data)
            .map_err(|e| Error::staging(format!("Corrupt staged snapshot {path}: {e}")))?;
        Ok(Some(table))
    }

    /// Merge new rows into the staged snapshot of a source by primary key.
    ///
    /// Returns the snapshot as written.
    pub async fn stage(&self, source: &str, schema: &TableSchema, rows: Vec<Record>) -> Result<Table> {
        let mut table = match self.get_table(source).await? {
            Some(existing) if existing.name == schema.name => existing,
            _ => schema.empty_table(),
        };
        table.columns = schema.column_names();
        table.primary_key.clone_from(&schema.primary_key);

        let appended = table.merge_rows(rows);
        self.put_table(source, &table).await?;

        info!(source, table = %table.name, appended, rows = table.len(), "Staged snapshot updated");
        Ok(table)
    }
}
