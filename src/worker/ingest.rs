use crate::core::{CountError, Item, Result, SubmitResponse};
use crate::storage::TenantItemBuffer;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Notify, mpsc};
use tracing::{Instrument, debug, error, warn};

/// Unbounded hand-off from request handlers to a single merging consumer.
///
/// Accepting an item only means it was queued; the merge into the buffer happens later on
/// the consumer task.
pub struct IngestionPipeline {
    tx: mpsc::UnboundedSender<Item>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl IngestionPipeline {
    /// Create the queue and start its consumer on the current runtime.
    pub fn spawn(buffer: Arc<TenantItemBuffer>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Item>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let consumer_in_flight = Arc::clone(&in_flight);
        let consumer_idle = Arc::clone(&idle);
        let consumer = async move {
            while let Some(item) = rx.recv().await {
                debug!(tenant = %item.tenant, id = %item.id, "processing item");
                buffer.add(item).await;
                if consumer_in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
                    consumer_idle.notify_waiters();
                }
            }
        };
        tokio::spawn(consumer.in_current_span());

        Self { tx, in_flight, idle }
    }

    /// Queue one well-formed item.
    pub fn enqueue(&self, item: Item) -> Result<()> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        self.tx.send(item).map_err(|_| {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            CountError::Task("ingestion queue is closed".to_string())
        })
    }

    /// Validate a batch and queue the items that pass.
    pub fn submit(&self, items: Vec<Item>) -> SubmitResponse {
        let mut response = SubmitResponse {
            accepted: 0,
            rejected: 0,
        };
        for item in items {
            if let Err(err) = item.validate() {
                warn!(id = %item.id, tenant = %item.tenant, error = %err, "skipping item");
                response.rejected += 1;
                continue;
            }
            match self.enqueue(item) {
                Ok(()) => response.accepted += 1,
                Err(err) => {
                    error!(error = %err, "failed to queue item");
                    response.rejected += 1;
                }
            }
        }
        response
    }

    /// Items queued but not yet merged.
    pub fn queued(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait until every item queued so far has been merged.
    pub async fn settle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.queued() == 0 {
                return;
            }
            notified.await;
        }
    }
}
