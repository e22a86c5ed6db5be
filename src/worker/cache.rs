use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    count: usize,
    invalidation_armed: bool,
}

/// Last known committed count per tenant.
///
/// A value served from the cache is dropped at most one TTL later, which bounds how stale a
/// query answer can be. At most one invalidation timer per tenant is pending at a time.
#[derive(Clone, Default)]
pub struct TenantCountCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl TenantCountCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, tenant: &str) -> Option<usize> {
        self.entries.lock().await.get(tenant).map(|entry| entry.count)
    }

    /// Record a fresh count, keeping any pending invalidation.
    pub async fn set(&self, tenant: &str, count: usize) {
        let mut entries = self.entries.lock().await;
        entries
            .entry(tenant.to_string())
            .and_modify(|entry| entry.count = count)
            .or_insert(CacheEntry {
                count,
                invalidation_armed: false,
            });
    }

    pub async fn invalidate(&self, tenant: &str) {
        self.entries.lock().await.remove(tenant);
    }

    /// Serve a non-zero cached count and arm its invalidation after `ttl`.
    ///
    /// Returns `None` for absent or zero entries; the caller is expected to fall back to
    /// durable storage.
    pub async fn hit(&self, tenant: &str, ttl: Duration) -> Option<usize> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(tenant)?;
        if entry.count == 0 {
            return None;
        }
        if !entry.invalidation_armed {
            entry.invalidation_armed = true;
            let entries = Arc::clone(&self.entries);
            let tenant = tenant.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                entries.lock().await.remove(&tenant);
            });
        }
        Some(entry.count)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
