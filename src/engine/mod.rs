//! Execution engine module
//!
//! One sync run per source, and concurrent runs across sources.
//!
//! # Overview
//!
//! A sync run walks the list endpoint, resolves which identifiers are new
//! against the identifier cache, fetches details for those only, upserts
//! them and then marks them as seen. Identifiers are cached strictly after
//! their records were persisted, so an interrupted run is safe to repeat.
//! Finally the staged snapshot of the source is updated for validation.

mod types;

pub use types::{RunSummary, SourceRun, SyncReport};

use crate::auth::{AuthRefresher, EnvFileCredentialStore, OAuthClient};
use crate::cache::{resolve, FileIdentifierStore, IdentifierStore};
use crate::config::{PipelineConfig, SourceConfig};
use crate::database::DatabaseEngine;
use crate::error::{Error, Result, ResultExt};
use crate::http::HttpClient;
use crate::pagination::PaginatedFetcher;
use crate::schema::lookup_path;
use crate::staging::StagingStore;
use crate::types::{JsonValue, Record, RecordId, Table};
use crate::validation::{ValidationReport, Validator};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A source together with its fetcher and credential
pub struct SourcePipeline {
    /// Source definition
    pub config: SourceConfig,
    /// Fetcher bound to the source's base URL
    pub fetcher: PaginatedFetcher,
    /// Credential of the source, if it authenticates
    pub auth: Option<Arc<AuthRefresher>>,
}

impl SourcePipeline {
    pub fn new(config: SourceConfig, fetcher: PaginatedFetcher) -> Self {
        Self {
            config,
            fetcher,
            auth: None,
        }
    }

    /// Attach the source's credential to the pipeline and its fetcher
    #[must_use]
    pub fn with_auth(mut self, auth: Arc<AuthRefresher>) -> Self {
        self.fetcher = self.fetcher.with_auth(Arc::clone(&auth));
        self.auth = Some(auth);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

/// Sync engine for orchestrating fetch, persist and validation
pub struct SyncEngine {
    database: Arc<DatabaseEngine>,
    cache: Arc<dyn IdentifierStore>,
    staging: Option<StagingStore>,
    sources: Vec<SourcePipeline>,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Create an engine without sources
    pub fn new(database: Arc<DatabaseEngine>, cache: Arc<dyn IdentifierStore>) -> Self {
        Self {
            database,
            cache,
            staging: None,
            sources: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build every store and source of a pipeline
    pub async fn from_config(config: &PipelineConfig, cancel: CancellationToken) -> Result<Self> {
        let database = if config.database.is_in_memory() {
            DatabaseEngine::in_memory()?
        } else {
            DatabaseEngine::open(&config.database.path)?
        };
        let cache: Arc<dyn IdentifierStore> = match &config.identifier_cache.path {
            Some(path) => Arc::new(FileIdentifierStore::open(path)?),
            None => Arc::new(FileIdentifierStore::in_memory()),
        };
        let staging = StagingStore::parse(&config.staging.url)?;

        let mut engine = Self::new(Arc::new(database), cache)
            .with_staging(staging)
            .with_cancellation(cancel.clone());

        for source in &config.sources {
            let http = HttpClient::with_config(config.http.client_config(&source.base_url))?;
            let fetcher = PaginatedFetcher::new(
                Arc::new(http),
                config.retry.error_policy(),
                config.retry.retry_policy(),
            )
            .with_cancellation(cancel.clone());

            let mut pipeline = SourcePipeline::new(source.clone(), fetcher);
            if let Some(ref auth) = source.auth {
                let store = Arc::new(EnvFileCredentialStore::new(
                    &auth.credentials_file,
                    auth.key_prefix(&source.name),
                ));
                let client = OAuthClient::new(&auth.token_url, &auth.client_id, &auth.client_secret);
                let refresher = AuthRefresher::load(&source.name, client, store)
                    .await
                    .with_context(|| format!("Source '{}'", source.name))?;
                pipeline = pipeline.with_auth(Arc::new(refresher));
            }
            engine.add_source(pipeline);
        }

        Ok(engine)
    }

    /// Keep staged snapshots in this store
    #[must_use]
    pub fn with_staging(mut self, staging: StagingStore) -> Self {
        self.staging = Some(staging);
        self
    }

    /// Refuse to start runs once this token is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Register a source
    pub fn add_source(&mut self, pipeline: SourcePipeline) {
        self.sources.push(pipeline);
    }

    pub fn database(&self) -> &DatabaseEngine {
        &self.database
    }

    pub fn cache(&self) -> &dyn IdentifierStore {
        self.cache.as_ref()
    }

    pub fn staging(&self) -> Option<&StagingStore> {
        self.staging.as_ref()
    }

    /// Names of the registered sources
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(SourcePipeline::name).collect()
    }

    /// Look up a registered source
    pub fn source(&self, name: &str) -> Result<&SourcePipeline> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .ok_or_else(|| Error::config(format!("Unknown source '{name}'")))
    }

    /// Sync every source concurrently. A failing source does not stop the
    /// others.
    pub async fn sync_all(&self) -> RunSummary {
        let runs = join_all(self.sources.iter().map(|pipeline| async move {
            let result = self.sync_source(pipeline).await;
            if let Err(ref e) = result {
                error!(source = %pipeline.name(), "Sync failed: {e}");
            }
            SourceRun {
                source: pipeline.name().to_string(),
                result,
            }
        }))
        .await;

        RunSummary { runs }
    }

    /// Sync one source by name
    pub async fn sync(&self, name: &str) -> Result<SyncReport> {
        self.sync_source(self.source(name)?).await
    }

    /// One sync run: fetch, resolve, detail, persist, mark seen, stage
    pub async fn sync_source(&self, pipeline: &SourcePipeline) -> Result<SyncReport> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let start = Instant::now();
        let config = &pipeline.config;
        let schema = &config.table;
        let mut report = SyncReport::new(&config.name, &schema.name);
        info!(source = %config.name, table = %schema.name, "Starting sync");

        self.database.ensure_table(schema)?;

        let registry = config.registry();
        let list = registry.list(&config.list_endpoint)?;
        let paginator = list.paginator().ok_or_else(|| {
            Error::config(format!("endpoint '{}' cannot be paged", config.list_endpoint))
        })?;
        let items = pipeline
            .fetcher
            .fetch_all(list.path(), &list.query_params(), paginator.as_ref())
            .await?;

        let mut fetched_ids = Vec::with_capacity(items.len());
        let mut summaries: HashMap<RecordId, JsonValue> = HashMap::new();
        for item in items {
            match lookup_path(&item, &config.id_field).and_then(RecordId::from_json) {
                Some(id) => {
                    fetched_ids.push(id.clone());
                    summaries.entry(id).or_insert(item);
                }
                None => warn!(
                    source = %config.name,
                    field = %config.id_field,
                    "List item without identifier, skipping"
                ),
            }
        }
        report.fetched = fetched_ids.len();

        let cache_key = config.cache_key();
        let known = self.cache.get_known_ids(&cache_key).await?;
        let new_ids = resolve(&fetched_ids, &known);
        report.new_ids = new_ids.len();
        info!(
            source = %config.name,
            fetched = report.fetched,
            known = known.len(),
            new = report.new_ids,
            "Resolved change set"
        );

        if new_ids.is_empty() {
            report.duration_ms = elapsed_ms(start);
            info!(source = %config.name, "Nothing new to sync");
            return Ok(report);
        }

        let payloads: Vec<(RecordId, JsonValue)> = match config.detail_endpoint {
            Some(ref name) => {
                let detail = registry.detail(name)?;
                let batch = pipeline.fetcher.fetch_details(detail.path(), &new_ids).await?;
                report.not_found = batch.not_found.len();
                let missing: HashSet<_> = batch.not_found.iter().collect();
                new_ids
                    .iter()
                    .filter(|id| !missing.contains(id))
                    .cloned()
                    .zip(batch.items)
                    .collect()
            }
            None => new_ids
                .iter()
                .filter_map(|id| summaries.remove(id).map(|item| (id.clone(), item)))
                .collect(),
        };

        let mut ids = Vec::with_capacity(payloads.len());
        let mut records: Vec<Record> = Vec::with_capacity(payloads.len());
        for (id, payload) in payloads {
            match schema.record_from_json(&payload) {
                Ok(record) => {
                    ids.push(id);
                    records.push(record);
                }
                Err(e) => {
                    warn!(source = %config.name, id = %id, "Skipping record: {e}");
                    report.unmapped += 1;
                }
            }
        }

        let result = self.database.upsert(schema, &records)?;
        report.inserted = result.inserted;
        report.updated = result.updated;
        report.failed = result.failed;

        let persisted: Vec<RecordId> = result.persisted.iter().map(|&i| ids[i].clone()).collect();
        report.cached = self.cache.add_ids(&cache_key, &persisted).await?;

        if let Some(ref staging) = self.staging {
            let snapshot = staging.stage(&config.name, schema, records).await?;
            report.staged_rows = snapshot.len();
        }

        report.duration_ms = elapsed_ms(start);
        info!(
            source = %config.name,
            inserted = report.inserted,
            updated = report.updated,
            failed = report.failed,
            cached = report.cached,
            "Sync complete"
        );
        Ok(report)
    }

    /// Staged snapshots and the matching persisted tables, for every source
    /// that has staged something
    pub async fn snapshots(&self) -> Result<(Vec<Table>, Vec<Table>)> {
        let staging = self
            .staging
            .as_ref()
            .ok_or_else(|| Error::config("No staging store configured"))?;

        let mut staged = Vec::new();
        let mut persisted = Vec::new();
        for pipeline in &self.sources {
            let Some(table) = staging.get_table(pipeline.name()).await? else {
                warn!(source = %pipeline.name(), "Nothing staged yet, skipping validation");
                continue;
            };
            self.database.ensure_table(&pipeline.config.table)?;
            persisted.push(self.database.fetch_table(&pipeline.config.table)?);
            staged.push(table);
        }
        Ok((staged, persisted))
    }

    /// Compare every staged snapshot with the database
    pub async fn validate(&self, validator: &Validator) -> Result<ValidationReport> {
        let (staged, persisted) = self.snapshots().await?;
        let mut rng = rand::rng();
        Ok(validator.validate(&staged, &persisted, &mut rng))
    }

    /// Number of identifiers cached for a source
    pub async fn known_ids(&self, name: &str) -> Result<usize> {
        let pipeline = self.source(name)?;
        Ok(self
            .cache
            .get_known_ids(&pipeline.config.cache_key())
            .await?
            .len())
    }

    /// Force a token refresh for a source
    pub async fn refresh(&self, name: &str) -> Result<()> {
        let pipeline = self.source(name)?;
        let auth = pipeline
            .auth
            .as_ref()
            .ok_or_else(|| Error::config(format!("Source '{name}' has no auth configured")))?;
        auth.refresh().await?;
        Ok(())
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("database", &self.database)
            .field("sources", &self.source_names())
            .field("staging", &self.staging)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests;
