use super::cache::TenantCountCache;
use crate::core::{CountError, Result};
use crate::storage::{DurableTenantStore, TenantItemBuffer};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, error};

/// Outcome of one backup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackupReport {
    /// Tenants merged into durable storage.
    pub tenants: usize,
    /// Buffered ids drained by the pass (before deduplication against disk).
    pub items: usize,
}

/// Drains the item buffer into durable storage and refreshes the count cache.
#[derive(Clone)]
pub struct BackupScheduler {
    buffer: Arc<TenantItemBuffer>,
    store: DurableTenantStore,
    cache: TenantCountCache,
}

impl BackupScheduler {
    pub fn new(
        buffer: Arc<TenantItemBuffer>,
        store: DurableTenantStore,
        cache: TenantCountCache,
    ) -> Self {
        Self {
            buffer,
            store,
            cache,
        }
    }

    /// Back up every buffered tenant concurrently and wait for all of them.
    ///
    /// A failed tenant does not stop the others; the first failure is returned once the
    /// whole pass has finished, and that tenant's ids are kept for the next pass.
    pub async fn run_pass(&self) -> Result<BackupReport> {
        let tenants = self.buffer.tenants().await;
        let tasks = tenants.into_iter().map(|tenant| {
            let scheduler = self.clone();
            let backup = async move { scheduler.backup_tenant(tenant).await };
            tokio::spawn(backup.in_current_span())
        });
        let results = futures::future::join_all(tasks).await;

        let mut report = BackupReport::default();
        let mut first_error = None;
        for result in results {
            match result.map_err(CountError::from).and_then(|outcome| outcome) {
                Ok(drained) => {
                    report.tenants += 1;
                    report.items += drained;
                }
                Err(err) => {
                    error!(error = %err, "tenant backup failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    async fn backup_tenant(&self, tenant: String) -> Result<usize> {
        let ids = self.buffer.drain(&tenant).await;
        let drained = ids.len();

        let store = self.store.clone();
        let merge_tenant = tenant.clone();
        let (outcome, ids) = tokio::task::spawn_blocking(move || {
            let outcome = store.merge(&merge_tenant, ids.iter().cloned());
            (outcome, ids)
        })
        .await?;

        match outcome {
            Ok(total) => {
                self.cache.set(&tenant, total).await;
                debug!(tenant = %tenant, drained, total, "tenant backed up");
                Ok(drained)
            }
            Err(err) => {
                self.buffer.restore(&tenant, ids).await;
                Err(err)
            }
        }
    }

    /// Run a pass now and then every `period`.
    pub fn spawn_ticker(&self, period: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        let ticking = async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = scheduler.run_pass().await {
                    error!(error = %err, "backup pass failed");
                }
            }
        };
        tokio::spawn(ticking.in_current_span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Item;
    use std::fs;
    use tempfile::TempDir;

    fn scheduler(dir: &TempDir) -> (BackupScheduler, Arc<TenantItemBuffer>, TenantCountCache) {
        let buffer = Arc::new(TenantItemBuffer::new());
        let cache = TenantCountCache::new();
        let store = DurableTenantStore::open(dir.path()).unwrap();
        (
            BackupScheduler::new(Arc::clone(&buffer), store, cache.clone()),
            buffer,
            cache,
        )
    }

    #[tokio::test]
    async fn test_pass_drains_buffer_and_sets_cache() {
        let dir = TempDir::new().unwrap();
        let (scheduler, buffer, cache) = scheduler(&dir);
        buffer.add(Item::new("1", "t1")).await;
        buffer.add(Item::new("2", "t1")).await;
        buffer.add(Item::new("1", "t2")).await;

        let report = scheduler.run_pass().await.unwrap();
        assert_eq!(report, BackupReport { tenants: 2, items: 3 });
        assert!(buffer.is_empty().await);
        assert_eq!(cache.get("t1").await, Some(2));
        assert_eq!(cache.get("t2").await, Some(1));
        assert!(dir.path().join("t1").exists());
    }

    #[tokio::test]
    async fn test_empty_pass_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let (scheduler, _buffer, cache) = scheduler(&dir);
        assert_eq!(scheduler.run_pass().await.unwrap(), BackupReport::default());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_repeated_ids_do_not_grow_the_count() {
        let dir = TempDir::new().unwrap();
        let (scheduler, buffer, cache) = scheduler(&dir);

        buffer.add(Item::new("1", "t1")).await;
        buffer.add(Item::new("2", "t1")).await;
        scheduler.run_pass().await.unwrap();

        buffer.add(Item::new("1", "t1")).await;
        scheduler.run_pass().await.unwrap();
        assert_eq!(cache.get("t1").await, Some(2));
    }

    #[tokio::test]
    async fn test_failed_merge_keeps_ids_for_next_pass() {
        let dir = TempDir::new().unwrap();
        let (scheduler, buffer, cache) = scheduler(&dir);
        fs::write(dir.path().join("bad"), "garbage").unwrap();

        buffer.add(Item::new("1", "bad")).await;
        buffer.add(Item::new("1", "good")).await;
        let result = scheduler.run_pass().await;

        assert!(matches!(result, Err(CountError::Serialization(_))));
        assert_eq!(cache.get("good").await, Some(1));
        assert_eq!(buffer.buffered("bad").await, 1);
        assert_eq!(buffer.buffered("good").await, 0);

        fs::remove_file(dir.path().join("bad")).unwrap();
        scheduler.run_pass().await.unwrap();
        assert_eq!(cache.get("bad").await, Some(1));
    }
}
