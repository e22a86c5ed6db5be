use super::Worker;
use crate::core::{CountResponse, Item, Result, SubmitResponse};
use crate::web::{self, WebError};
use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub fn router(worker: Arc<Worker>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/kill", get(kill).post(kill))
        .route("/items", post(submit_items))
        .route("/items/:tenant/count", get(count))
        .layer(TraceLayer::new_for_http())
        .with_state(worker)
}

/// Serve until the worker's shutdown signal fires.
pub async fn serve(worker: Arc<Worker>, listener: TcpListener) -> Result<()> {
    let mut shutdown = worker.subscribe_shutdown();
    let address = listener.local_addr()?;
    info!(%address, "worker up");
    axum::serve(listener, router(worker))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;
    Ok(())
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn kill(State(worker): State<Arc<Worker>>) -> web::Result<StatusCode> {
    worker.terminate().await?;
    Ok(StatusCode::OK)
}

async fn submit_items(
    State(worker): State<Arc<Worker>>,
    body: Bytes,
) -> web::Result<Json<SubmitResponse>> {
    let items: Vec<Item> = serde_json::from_slice(&body)
        .map_err(|e| WebError::Input(format!("expected a JSON array of items: {}", e)))?;
    let response = worker.submit(items);
    debug!(
        accepted = response.accepted,
        rejected = response.rejected,
        "items queued"
    );
    Ok(Json(response))
}

async fn count(
    State(worker): State<Arc<Worker>>,
    Path(tenant): Path<String>,
) -> web::Result<Json<CountResponse>> {
    let count = worker.count(&tenant).await?;
    Ok(Json(CountResponse { count }))
}
