use crate::core::{CountError, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{Method, StatusCode};

/// A request as it is sent to a worker, body already buffered.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    pub path_and_query: String,
    pub body: Bytes,
}

impl OutboundRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            body: body.into(),
        }
    }
}

/// Whatever the worker answered, copied back to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Transport between the coordinator and its workers.
///
/// Every error is treated as a network failure by callers.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    /// `GET /` on the worker; `Ok(true)` only for a 200.
    async fn probe(&self, address: &str) -> Result<bool>;

    /// `GET /kill` on the worker.
    async fn terminate(&self, address: &str) -> Result<()>;

    async fn forward(&self, address: &str, request: &OutboundRequest) -> Result<ForwardedResponse>;
}

/// `WorkerClient` over HTTP with reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpWorkerClient {
    client: reqwest::Client,
}

impl HttpWorkerClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn url(address: &str, path: &str) -> String {
        format!("{}{}", address.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl WorkerClient for HttpWorkerClient {
    async fn probe(&self, address: &str) -> Result<bool> {
        let response = self
            .client
            .get(Self::url(address, "/"))
            .send()
            .await
            .map_err(|e| CountError::unreachable(address, e))?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    async fn terminate(&self, address: &str) -> Result<()> {
        self.client
            .get(Self::url(address, "/kill"))
            .send()
            .await
            .map_err(|e| CountError::unreachable(address, e))?;
        Ok(())
    }

    async fn forward(&self, address: &str, request: &OutboundRequest) -> Result<ForwardedResponse> {
        // reqwest 0.11 sits on http 0.2, axum on http 1
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| CountError::Task(format!("unsupported method: {}", e)))?;

        let response = self
            .client
            .request(method, Self::url(address, &request.path_and_query))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| CountError::unreachable(address, e))?;

        let status = StatusCode::from_u16(response.status().as_u16())
            .map_err(|e| CountError::unreachable(address, e))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| CountError::unreachable(address, e))?;
        Ok(ForwardedResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        assert_eq!(
            HttpWorkerClient::url("http://localhost:5001/", "/items"),
            "http://localhost:5001/items"
        );
        assert_eq!(
            HttpWorkerClient::url("http://localhost:5001", "/items/t1/count"),
            "http://localhost:5001/items/t1/count"
        );
    }

    #[tokio::test]
    async fn probe_of_closed_port_is_network_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = HttpWorkerClient::new().probe(&address).await.unwrap_err();
        assert!(matches!(err, CountError::WorkerUnreachable { .. }));
    }
}
