use super::{Cli, Command, CoordinatorArgs, WorkerArgs};
use anyhow::{Context, Result};
use clap::Parser;
use countd::config::{ConfigSource, FileConfigSource};
use countd::coordinator::{Coordinator, ForwardPolicy, HttpWorkerClient, LocalProcessSupervisor};
use countd::worker::Worker;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub struct App {
    cli: Cli,
}

impl App {
    pub fn from_args() -> Self {
        Self { cli: Cli::parse() }
    }

    pub async fn run(self) -> Result<()> {
        let Cli { config, command } = self.cli;
        match command {
            Command::Coordinator(args) => run_coordinator(&config, args).await,
            Command::Worker(args) => {
                let span = info_span!("worker", port = args.port);
                run_worker(&config, args).instrument(span).await
            }
        }
    }
}

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("countd=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_config(path: &Path) -> Result<FileConfigSource> {
    FileConfigSource::open(path)
        .with_context(|| format!("failed to load config '{}'", path.display()))
}

async fn bind(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))
}

async fn run_coordinator(config_path: &Path, args: CoordinatorArgs) -> Result<()> {
    let config = open_config(config_path)?;
    let snapshot = config.snapshot()?;
    std::fs::create_dir_all(&snapshot.log_dir).with_context(|| {
        format!(
            "failed to create worker log directory '{}'",
            snapshot.log_dir.display()
        )
    })?;

    let supervisor = LocalProcessSupervisor::current_exe(config_path)
        .context("failed to locate the countd executable")?;

    let mut policy =
        ForwardPolicy::unbounded().retry_delay(Duration::from_millis(args.retry_delay_ms));
    if let Some(attempts) = args.max_attempts {
        policy = policy.max_attempts(attempts);
    }

    let coordinator = Coordinator::builder(
        Arc::new(config),
        Arc::new(HttpWorkerClient::new()),
        Arc::new(supervisor),
    )
    .policy(policy)
    .build();

    let reconcile = coordinator.start_reconcile_loop()?;
    let listener = bind(&args.host, args.port).await?;
    info!(
        workers = snapshot.workers.len(),
        max_attempts = ?policy.max_attempts,
        "coordinator started"
    );

    coordinator
        .serve(listener, shutdown_signal())
        .await
        .context("coordinator server error")?;
    reconcile.abort();
    Ok(())
}

async fn run_worker(config_path: &Path, args: WorkerArgs) -> Result<()> {
    let config = open_config(config_path)?;
    let worker = Arc::new(Worker::new(Arc::new(config)).context("failed to open worker storage")?);
    let listener = bind(&args.host, args.port).await?;

    let ticker = worker.start_backup_ticker()?;
    let signalled = Arc::clone(&worker);
    tokio::spawn(
        async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            signalled.request_shutdown();
        }
        .in_current_span(),
    );

    countd::worker::serve(Arc::clone(&worker), listener)
        .await
        .context("worker server error")?;
    ticker.abort();

    let report = worker.backup().await.context("final backup failed")?;
    info!(
        tenants = report.tenants,
        items = report.items,
        "worker stopped"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
