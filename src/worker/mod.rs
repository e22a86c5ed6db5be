//! Worker role.
//!
//! A worker accepts items into an in-memory buffer, commits the buffer to its own durable
//! per-tenant files on a timer, and answers count queries from a cache that may lag the
//! submitted items by up to one backup interval.

pub mod backup;
pub mod cache;
pub mod ingest;
pub mod server;

pub use backup::{BackupReport, BackupScheduler};
pub use cache::TenantCountCache;
pub use ingest::IngestionPipeline;
pub use server::{router, serve};

use crate::config::ConfigSource;
use crate::core::{Item, Result, SubmitResponse, validate_tenant};
use crate::storage::{DurableTenantStore, TenantItemBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Delay between a termination request's backup and the server shutdown.
pub const DEFAULT_SHUTDOWN_DELAY: Duration = Duration::from_secs(1);

/// All state owned by one worker process.
pub struct Worker {
    config: Arc<dyn ConfigSource>,
    buffer: Arc<TenantItemBuffer>,
    cache: TenantCountCache,
    store: DurableTenantStore,
    pipeline: IngestionPipeline,
    backup: BackupScheduler,
    shutdown: watch::Sender<bool>,
    shutdown_delay: Duration,
}

impl Worker {
    /// Build the worker and start its ingestion consumer.
    ///
    /// Creates the storage directory named by the current config snapshot.
    pub fn new(config: Arc<dyn ConfigSource>) -> Result<Self> {
        let snapshot = config.snapshot()?;
        let store = DurableTenantStore::open(&snapshot.storage_dir)?;
        let buffer = Arc::new(TenantItemBuffer::new());
        let cache = TenantCountCache::new();
        let pipeline = IngestionPipeline::spawn(Arc::clone(&buffer));
        let backup = BackupScheduler::new(Arc::clone(&buffer), store.clone(), cache.clone());
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            config,
            buffer,
            cache,
            store,
            pipeline,
            backup,
            shutdown,
            shutdown_delay: DEFAULT_SHUTDOWN_DELAY,
        })
    }

    pub fn with_shutdown_delay(mut self, delay: Duration) -> Self {
        self.shutdown_delay = delay;
        self
    }

    /// Queue the well-formed items of a batch.
    pub fn submit(&self, items: Vec<Item>) -> SubmitResponse {
        self.pipeline.submit(items)
    }

    /// Best known committed count for a tenant.
    ///
    /// Served from the cache when it holds a non-zero value, otherwise read from durable
    /// storage and cached. Buffered items are never consulted.
    pub async fn count(&self, tenant: &str) -> Result<usize> {
        validate_tenant(tenant)?;
        let ttl = self.config.snapshot()?.backup_interval;
        if let Some(count) = self.cache.hit(tenant, ttl).await {
            return Ok(count);
        }

        debug!(tenant = %tenant, "fetching count from storage");
        let store = self.store.clone();
        let owned = tenant.to_string();
        let count = tokio::task::spawn_blocking(move || store.count(&owned)).await??;
        self.cache.set(tenant, count).await;
        Ok(count)
    }

    /// Merge everything accepted so far, then run one backup pass.
    pub async fn backup(&self) -> Result<BackupReport> {
        self.pipeline.settle().await;
        self.backup.run_pass().await
    }

    /// Start the periodic backup, first pass immediately.
    pub fn start_backup_ticker(&self) -> Result<JoinHandle<()>> {
        let period = self.config.snapshot()?.backup_interval;
        Ok(self.backup.spawn_ticker(period))
    }

    /// Back up synchronously, then stop serving after the shutdown delay.
    ///
    /// The shutdown is scheduled even when the backup fails.
    pub async fn terminate(&self) -> Result<BackupReport> {
        info!("gracefully terminating worker");
        let report = self.backup().await;

        let shutdown = self.shutdown.clone();
        let delay = self.shutdown_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            shutdown.send_replace(true);
        });
        report
    }

    /// Stop serving immediately.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub fn buffer(&self) -> &TenantItemBuffer {
        &self.buffer
    }

    pub fn cache(&self) -> &TenantCountCache {
        &self.cache
    }

    pub fn store(&self) -> &DurableTenantStore {
        &self.store
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }
}
