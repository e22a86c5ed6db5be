use super::forward::{ForwardRequest, ForwardingQueue};
use crate::core::Result;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

pub fn router(queue: ForwardingQueue) -> Router {
    Router::new()
        .route("/items", post(enqueue))
        .route("/items/:tenant/count", get(enqueue))
        .layer(TraceLayer::new_for_http())
        .with_state(queue)
}

pub async fn serve<F>(queue: ForwardingQueue, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let address = listener.local_addr()?;
    info!(%address, "coordinator up");
    axum::serve(listener, router(queue))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Blocks until the forwarding queue resolves the request.
async fn enqueue(State(queue): State<ForwardingQueue>, request: Request) -> Response {
    let request = ForwardRequest::from_request(request);
    let request_id = request.id();
    match queue.dispatch(request).await {
        Some(forwarded) => {
            let mut response = (forwarded.status, forwarded.body).into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            response
        }
        None => {
            debug!(request_id = %request_id, "request dropped without a worker response");
            StatusCode::OK.into_response()
        }
    }
}
