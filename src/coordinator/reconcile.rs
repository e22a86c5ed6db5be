use super::alive::AliveWorkerSet;
use super::client::WorkerClient;
use super::supervisor::WorkerProcessSupervisor;
use crate::config::ConfigSource;
use crate::core::{CountError, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Drives the alive set toward the configured worker pool.
#[derive(Clone)]
pub struct Reconciler {
    config: Arc<dyn ConfigSource>,
    alive: AliveWorkerSet,
    client: Arc<dyn WorkerClient>,
    supervisor: Arc<dyn WorkerProcessSupervisor>,
}

/// Tasks started by one reconciliation pass.
///
/// Dropping the pass detaches its tasks; they keep running.
pub struct ReconcilePass {
    /// Configured addresses, each probed (and launched if needed).
    pub desired: Vec<String>,
    /// Alive addresses outside the config, removed and sent a termination call.
    pub terminated: Vec<String>,
    tasks: Vec<JoinHandle<Result<()>>>,
}

impl ReconcilePass {
    /// Wait for every per-worker task of the pass.
    ///
    /// A task that launched a worker only finishes when that process exits.
    pub async fn settled(self) -> Vec<Result<()>> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for outcome in futures::future::join_all(self.tasks).await {
            outcomes.push(outcome.map_err(CountError::from).and_then(|r| r));
        }
        outcomes
    }
}

impl Reconciler {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        alive: AliveWorkerSet,
        client: Arc<dyn WorkerClient>,
        supervisor: Arc<dyn WorkerProcessSupervisor>,
    ) -> Self {
        Self {
            config,
            alive,
            client,
            supervisor,
        }
    }

    pub fn alive(&self) -> &AliveWorkerSet {
        &self.alive
    }

    /// Start one pass against the current config snapshot.
    ///
    /// Workers outside the config are removed from the alive set before this returns.
    pub async fn reconcile(&self) -> Result<ReconcilePass> {
        let snapshot = self.config.snapshot()?;
        let desired: BTreeSet<String> = snapshot.workers.iter().cloned().collect();
        let mut tasks = Vec::with_capacity(desired.len());

        for address in &desired {
            let this = self.clone();
            let address = address.clone();
            let log_dir = snapshot.log_dir.clone();
            tasks.push(tokio::spawn(async move {
                this.ensure_worker(&address, &log_dir).await
            }));
        }

        let mut terminated = Vec::new();
        for address in self.alive.snapshot().await {
            if desired.contains(&address) {
                continue;
            }
            self.alive.remove(&address).await;
            terminated.push(address.clone());

            let this = self.clone();
            tasks.push(tokio::spawn(async move {
                this.stop_worker(&address).await;
                Ok(())
            }));
        }

        Ok(ReconcilePass {
            desired: desired.into_iter().collect(),
            terminated,
            tasks,
        })
    }

    async fn ensure_worker(&self, address: &str, log_dir: &Path) -> Result<()> {
        match self.client.probe(address).await {
            Ok(true) => {
                self.alive.mark_alive(address).await;
                return Ok(());
            }
            Ok(false) => debug!(address = %address, "worker answered probe without 200"),
            Err(err) => {
                debug!(address = %address, error = %err, "worker probe failed");
                self.alive.remove(address).await;
            }
        }

        info!(address = %address, "spawning worker");
        let mut process = self
            .supervisor
            .start(address, log_dir)
            .await
            .inspect_err(|err| error!(address = %address, error = %err, "failed to spawn worker"))?;

        match process.wait().await {
            Ok(code) => info!(address = %address, ?code, "worker process exited"),
            Err(err) => warn!(address = %address, error = %err, "lost track of worker process"),
        }
        Ok(())
    }

    async fn stop_worker(&self, address: &str) {
        info!(address = %address, "killing worker");
        if let Err(err) = self.client.terminate(address).await {
            debug!(address = %address, error = %err, "termination call failed");
        }
    }

    /// Run a detached pass, e.g. after a worker stopped answering.
    pub fn trigger(&self) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.reconcile().await {
                warn!(error = %err, "out-of-band reconciliation failed");
            }
        });
    }

    /// Reconcile now and then once per `period`.
    pub fn spawn_loop(&self, period: Duration) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match this.reconcile().await {
                    Ok(pass) => debug!(
                        desired = pass.desired.len(),
                        terminated = pass.terminated.len(),
                        "reconciliation pass started"
                    ),
                    Err(err) => warn!(error = %err, "reconciliation pass failed"),
                }
            }
        })
    }
}
