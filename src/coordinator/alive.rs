use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Worker addresses currently believed responsive.
///
/// Absence means not alive; entries are removed rather than flagged.
#[derive(Debug, Clone, Default)]
pub struct AliveWorkerSet {
    workers: Arc<Mutex<BTreeSet<String>>>,
}

impl AliveWorkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the address was not already present.
    pub async fn mark_alive(&self, address: &str) -> bool {
        let mut workers = self.workers.lock().await;
        if workers.contains(address) {
            return false;
        }
        workers.insert(address.to_string())
    }

    /// Returns true if the address was present.
    pub async fn remove(&self, address: &str) -> bool {
        self.workers.lock().await.remove(address)
    }

    pub async fn contains(&self, address: &str) -> bool {
        self.workers.lock().await.contains(address)
    }

    /// Sorted copy of the current members.
    pub async fn snapshot(&self) -> Vec<String> {
        self.workers.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_and_remove() {
        let alive = AliveWorkerSet::new();
        assert!(alive.mark_alive("http://localhost:5002").await);
        assert!(alive.mark_alive("http://localhost:5001").await);
        assert!(!alive.mark_alive("http://localhost:5001").await);

        assert_eq!(
            alive.snapshot().await,
            vec!["http://localhost:5001", "http://localhost:5002"]
        );

        assert!(alive.remove("http://localhost:5001").await);
        assert!(!alive.remove("http://localhost:5001").await);
        assert!(!alive.contains("http://localhost:5001").await);
        assert_eq!(alive.len().await, 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let alive = AliveWorkerSet::new();
        let other = alive.clone();
        other.mark_alive("http://localhost:5001").await;
        assert!(alive.contains("http://localhost:5001").await);
        assert!(!alive.is_empty().await);
    }
}
