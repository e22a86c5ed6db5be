use crate::core::Item;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Items received since the last backup, keyed by tenant.
///
/// The lock is held only for the map mutation itself.
#[derive(Default)]
pub struct TenantItemBuffer {
    tenants: Mutex<HashMap<String, HashSet<String>>>,
}

impl TenantItemBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one item, creating the tenant entry on first sight.
    pub async fn add(&self, item: Item) {
        let mut tenants = self.tenants.lock().await;
        tenants.entry(item.tenant).or_default().insert(item.id);
    }

    /// Remove and return the tenant's buffered ids.
    ///
    /// The entry stays absent until new items arrive for the tenant.
    pub async fn drain(&self, tenant: &str) -> HashSet<String> {
        self.tenants
            .lock()
            .await
            .remove(tenant)
            .unwrap_or_default()
    }

    /// Put drained ids back, e.g. after a failed durable merge.
    pub async fn restore(&self, tenant: &str, ids: HashSet<String>) {
        if ids.is_empty() {
            return;
        }
        let mut tenants = self.tenants.lock().await;
        tenants.entry(tenant.to_string()).or_default().extend(ids);
    }

    /// Tenants with buffered items.
    pub async fn tenants(&self) -> Vec<String> {
        self.tenants.lock().await.keys().cloned().collect()
    }

    /// Number of distinct ids buffered for a tenant.
    pub async fn buffered(&self, tenant: &str) -> usize {
        self.tenants
            .lock()
            .await
            .get(tenant)
            .map_or(0, HashSet::len)
    }

    pub async fn is_empty(&self) -> bool {
        self.tenants.lock().await.is_empty()
    }
}
