use super::client::{ForwardedResponse, OutboundRequest, WorkerClient};
use crate::core::{CountError, Result};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;

/// A peer worker inside the in-memory cluster.
#[derive(Clone)]
struct InMemoryPeer {
    router: Router,
    reachable: bool,
}

/// One call observed by the client, in order of arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub address: String,
    pub method: Method,
    pub path: String,
}

/// An in-memory implementation of `WorkerClient` for testing.
///
/// Simulates the network by driving registered routers directly. Unregistered peers, and
/// peers marked unreachable, fail every call the way a refused connection would.
#[derive(Clone, Default)]
pub struct InMemoryWorkerClient {
    peers: Arc<Mutex<HashMap<String, InMemoryPeer>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl InMemoryWorkerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reachable peer serving `router`.
    pub async fn register_peer(&self, address: impl Into<String>, router: Router) {
        let mut peers = self.peers.lock().await;
        peers.insert(
            address.into(),
            InMemoryPeer {
                router,
                reachable: true,
            },
        );
    }

    /// Simulate a network partition (or its end) for an existing peer.
    pub async fn set_reachable(&self, address: &str, reachable: bool) -> Result<()> {
        let mut peers = self.peers.lock().await;
        let peer = peers.get_mut(address).ok_or_else(|| {
            CountError::unreachable(address, "peer is not registered with the in-memory client")
        })?;
        peer.reachable = reachable;
        Ok(())
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Calls to `address` whose path is `path`.
    pub async fn calls_to(&self, address: &str, path: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.address == address && call.path == path)
            .count()
    }

    async fn call(
        &self,
        address: &str,
        method: Method,
        path: &str,
        body: Body,
    ) -> Result<ForwardedResponse> {
        self.calls.lock().await.push(RecordedCall {
            address: address.to_string(),
            method: method.clone(),
            path: path.to_string(),
        });

        let router = {
            let peers = self.peers.lock().await;
            match peers.get(address) {
                Some(peer) if peer.reachable => peer.router.clone(),
                Some(_) => return Err(CountError::unreachable(address, "connection refused")),
                None => return Err(CountError::unreachable(address, "no such host")),
            }
        };

        let request = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .map_err(|e| CountError::Task(e.to_string()))?;

        let response = router
            .oneshot(request)
            .await
            .map_err(|e| CountError::unreachable(address, e))?;
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| CountError::unreachable(address, e))?;
        Ok(ForwardedResponse { status, body })
    }
}

#[async_trait]
impl WorkerClient for InMemoryWorkerClient {
    async fn probe(&self, address: &str) -> Result<bool> {
        let response = self.call(address, Method::GET, "/", Body::empty()).await?;
        Ok(response.status == StatusCode::OK)
    }

    async fn terminate(&self, address: &str) -> Result<()> {
        self.call(address, Method::GET, "/kill", Body::empty())
            .await?;
        Ok(())
    }

    async fn forward(&self, address: &str, request: &OutboundRequest) -> Result<ForwardedResponse> {
        self.call(
            address,
            request.method.clone(),
            &request.path_and_query,
            Body::from(request.body.clone()),
        )
        .await
    }
}
