//! Coordinator role.
//!
//! The coordinator owns no item data. It keeps the worker pool matching the config
//! (probing, launching, terminating) and relays every client request to some alive
//! worker, retrying through its queue until a worker answers.

pub mod alive;
pub mod client;
pub mod forward;
pub mod in_memory;
pub mod reconcile;
pub mod selector;
pub mod server;
pub mod supervisor;

pub use alive::AliveWorkerSet;
pub use client::{ForwardedResponse, HttpWorkerClient, OutboundRequest, WorkerClient};
pub use forward::{ForwardPolicy, ForwardRequest, ForwardingQueue};
pub use in_memory::{InMemoryWorkerClient, RecordedCall};
pub use reconcile::{ReconcilePass, Reconciler};
pub use selector::{RandomSelector, WorkerSelector};
pub use server::{router, serve};
pub use supervisor::{LocalProcessSupervisor, WorkerProcess, WorkerProcessSupervisor};

use crate::config::ConfigSource;
use crate::core::Result;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The assembled coordinator: alive set, reconciler and forwarding queue.
pub struct Coordinator {
    config: Arc<dyn ConfigSource>,
    alive: AliveWorkerSet,
    reconciler: Reconciler,
    queue: ForwardingQueue,
}

impl Coordinator {
    pub fn builder(
        config: Arc<dyn ConfigSource>,
        client: Arc<dyn WorkerClient>,
        supervisor: Arc<dyn WorkerProcessSupervisor>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            config,
            client,
            supervisor,
            selector: Arc::new(RandomSelector),
            policy: ForwardPolicy::default(),
        }
    }

    /// Start the reconciliation loop; its first pass runs immediately.
    pub fn start_reconcile_loop(&self) -> Result<JoinHandle<()>> {
        let period = self.config.snapshot()?.reconcile_interval;
        Ok(self.reconciler.spawn_loop(period))
    }

    pub fn router(&self) -> Router {
        router(self.queue.clone())
    }

    /// Serve client requests until `shutdown` resolves.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        serve(self.queue.clone(), listener, shutdown).await
    }

    pub fn alive(&self) -> &AliveWorkerSet {
        &self.alive
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }
}

pub struct CoordinatorBuilder {
    config: Arc<dyn ConfigSource>,
    client: Arc<dyn WorkerClient>,
    supervisor: Arc<dyn WorkerProcessSupervisor>,
    selector: Arc<dyn WorkerSelector>,
    policy: ForwardPolicy,
}

impl CoordinatorBuilder {
    pub fn selector(mut self, selector: Arc<dyn WorkerSelector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn policy(mut self, policy: ForwardPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Spawns the forwarding consumer, so this must run inside a tokio runtime.
    pub fn build(self) -> Coordinator {
        let alive = AliveWorkerSet::new();
        let reconciler = Reconciler::new(
            Arc::clone(&self.config),
            alive.clone(),
            Arc::clone(&self.client),
            self.supervisor,
        );
        let queue = ForwardingQueue::spawn(
            alive.clone(),
            self.selector,
            self.client,
            reconciler.clone(),
            self.policy,
        );
        Coordinator {
            config: self.config,
            alive,
            reconciler,
            queue,
        }
    }
}
