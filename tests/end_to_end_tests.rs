use async_trait::async_trait;
use countd::coordinator::{
    Coordinator, ForwardPolicy, HttpWorkerClient, WorkerClient, WorkerProcess,
    WorkerProcessSupervisor,
};
use countd::worker::{self, Worker};
use countd::{ConfigSnapshot, CountError, Result, StaticConfigSource};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::net::TcpListener;

struct RefusingSupervisor;

#[async_trait]
impl WorkerProcessSupervisor for RefusingSupervisor {
    async fn start(&self, address: &str, _log_dir: &Path) -> Result<Box<dyn WorkerProcess>> {
        Err(CountError::Spawn(format!("unexpected launch of {}", address)))
    }
}

#[tokio::test]
async fn items_flow_through_coordinator_to_a_real_worker() {
    let dir = tempdir().unwrap();

    let worker_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let worker_address = format!("http://{}", worker_listener.local_addr().unwrap());
    let snapshot = ConfigSnapshot::new(dir.path().join("db"), dir.path().join("logs"))
        .workers([worker_address.clone()])
        .backup_interval(Duration::from_millis(50))
        .reconcile_interval(Duration::from_millis(50));
    let config = Arc::new(StaticConfigSource::new(snapshot));

    let worker = Arc::new(
        Worker::new(config.clone())
            .unwrap()
            .with_shutdown_delay(Duration::from_millis(10)),
    );
    let _backups = worker.start_backup_ticker().unwrap();
    let worker_server = tokio::spawn(worker::serve(Arc::clone(&worker), worker_listener));

    let client = Arc::new(HttpWorkerClient::new());
    let coordinator = Coordinator::builder(config, client.clone(), Arc::new(RefusingSupervisor))
        .policy(ForwardPolicy::unbounded())
        .build();
    let pass = coordinator.reconciler().reconcile().await.unwrap();
    assert!(pass.settled().await.iter().all(|outcome| outcome.is_ok()));
    assert!(coordinator.alive().contains(&worker_address).await);

    let coordinator_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let coordinator_address = format!("http://{}", coordinator_listener.local_addr().unwrap());
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let router = coordinator.router();
    let coordinator_server = tokio::spawn(async move {
        axum::serve(coordinator_listener, router)
            .with_graceful_shutdown(async {
                let _ = stopped.await;
            })
            .await
    });

    let http = reqwest::Client::new();
    let submitted: Value = http
        .post(format!("{}/items", coordinator_address))
        .json(&json!([
            {"id": "1", "tenant": "t1"},
            {"id": "2", "tenant": "t1"},
            {"id": "1", "tenant": "t1"}
        ]))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(submitted, json!({"accepted": 3, "rejected": 0}));

    let mut count = json!(null);
    for _ in 0..100 {
        let response = http
            .get(format!("{}/items/t1/count", coordinator_address))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        count = response.json().await.unwrap();
        if count == json!({"count": 2}) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(count, json!({"count": 2}));

    client.terminate(&worker_address).await.unwrap();
    worker_server.await.unwrap().unwrap();
    assert!(worker.is_shutting_down());

    let _ = stop.send(());
    coordinator_server.await.unwrap().unwrap();
}
