use super::alive::AliveWorkerSet;
use super::client::{ForwardedResponse, OutboundRequest, WorkerClient};
use super::reconcile::Reconciler;
use super::selector::WorkerSelector;
use crate::core::CountError;
use crate::web::WebError;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::Method;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bound on the retry cycle of a queued request.
///
/// The default retries forever without delay, holding the caller until some worker answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardPolicy {
    pub max_attempts: Option<u32>,
    pub retry_delay: Duration,
}

impl ForwardPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Give up with 503 after `attempts` failed attempts.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts.max(1));
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

enum RequestBody {
    Pending(Body),
    Buffered(Bytes),
}

/// An inbound client request waiting for a worker.
pub struct ForwardRequest {
    id: Uuid,
    method: Method,
    path_and_query: String,
    body: RequestBody,
}

impl ForwardRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>, body: Body) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path_and_query: path_and_query.into(),
            body: RequestBody::Pending(body),
        }
    }

    pub fn from_request(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        Self::new(parts.method, path_and_query, body)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Read the body on first use; later attempts replay the same bytes.
    async fn body(&mut self) -> Result<Bytes, axum::Error> {
        let body = std::mem::replace(&mut self.body, RequestBody::Buffered(Bytes::new()));
        let bytes = match body {
            RequestBody::Pending(body) => axum::body::to_bytes(body, usize::MAX).await?,
            RequestBody::Buffered(bytes) => bytes,
        };
        self.body = RequestBody::Buffered(bytes.clone());
        Ok(bytes)
    }
}

/// `None` means the request was dropped without an answer.
pub type Completion = oneshot::Receiver<Option<ForwardedResponse>>;

struct QueuedRequest {
    request: ForwardRequest,
    completion: oneshot::Sender<Option<ForwardedResponse>>,
    attempts: u32,
}

struct Dispatcher {
    alive: AliveWorkerSet,
    selector: Arc<dyn WorkerSelector>,
    client: Arc<dyn WorkerClient>,
    reconciler: Reconciler,
    policy: ForwardPolicy,
    requeue: mpsc::UnboundedSender<QueuedRequest>,
}

/// Hands client requests to alive workers, retrying through the tail of the queue.
///
/// One consumer pulls requests and starts an independent task per request.
#[derive(Clone)]
pub struct ForwardingQueue {
    tx: mpsc::UnboundedSender<QueuedRequest>,
}

impl ForwardingQueue {
    /// Create the queue and start its consumer.
    pub fn spawn(
        alive: AliveWorkerSet,
        selector: Arc<dyn WorkerSelector>,
        client: Arc<dyn WorkerClient>,
        reconciler: Reconciler,
        policy: ForwardPolicy,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<QueuedRequest>();
        let dispatcher = Arc::new(Dispatcher {
            alive,
            selector,
            client,
            reconciler,
            policy,
            requeue: tx.clone(),
        });

        tokio::spawn(async move {
            while let Some(queued) = rx.recv().await {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move { dispatcher.forward(queued).await });
            }
        });

        Self { tx }
    }

    /// Place a request at the tail of the queue without waiting.
    pub fn enqueue(&self, request: ForwardRequest) -> Completion {
        let (completion, done) = oneshot::channel();
        let queued = QueuedRequest {
            request,
            completion,
            attempts: 0,
        };
        if self.tx.send(queued).is_err() {
            warn!("forwarding queue is closed");
        }
        done
    }

    /// Enqueue and wait for the completion signal.
    pub async fn dispatch(&self, request: ForwardRequest) -> Option<ForwardedResponse> {
        self.enqueue(request).await.ok().flatten()
    }
}

impl Dispatcher {
    async fn forward(&self, mut queued: QueuedRequest) {
        let request_id = queued.request.id;
        let alive = self.alive.snapshot().await;
        let Some(address) = self.selector.select(&alive) else {
            debug!(request_id = %request_id, "no workers ready");
            self.retry(queued).await;
            return;
        };

        let body = match queued.request.body().await {
            Ok(body) => body,
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "failed to read request body, dropping");
                let _ = queued.completion.send(None);
                return;
            }
        };

        let outbound = OutboundRequest {
            method: queued.request.method.clone(),
            path_and_query: queued.request.path_and_query.clone(),
            body,
        };
        info!(
            request_id = %request_id,
            method = %outbound.method,
            address = %address,
            path = %outbound.path_and_query,
            "forwarding"
        );

        match self.client.forward(&address, &outbound).await {
            Ok(response) => {
                self.alive.mark_alive(&address).await;
                debug!(request_id = %request_id, status = %response.status, "worker answered");
                let _ = queued.completion.send(Some(response));
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    address = %address,
                    error = %err,
                    "retrying: error while sending request"
                );
                self.reconciler.trigger();
                self.retry(queued).await;
            }
        }
    }

    async fn retry(&self, mut queued: QueuedRequest) {
        queued.attempts += 1;
        if let Some(max) = self.policy.max_attempts
            && queued.attempts >= max
        {
            warn!(
                request_id = %queued.request.id,
                attempts = queued.attempts,
                "giving up on request"
            );
            let (status, body) = WebError::from(CountError::NoWorkersReady).to_status_and_body();
            let _ = queued.completion.send(Some(ForwardedResponse {
                status,
                body: Bytes::from(body),
            }));
            return;
        }

        if !self.policy.retry_delay.is_zero() {
            tokio::time::sleep(self.policy.retry_delay).await;
        }
        if self.requeue.send(queued).is_err() {
            warn!("forwarding queue is closed, dropping request");
        }
    }
}
