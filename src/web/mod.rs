//! HTTP error mapping shared by the worker and coordinator routers.

use crate::core::CountError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug)]
pub enum WebError {
    Count(CountError),
    Input(String),
}

impl From<CountError> for WebError {
    fn from(err: CountError) -> Self {
        WebError::Count(err)
    }
}

impl WebError {
    fn parts(self) -> (StatusCode, String, &'static str) {
        match self {
            WebError::Count(
                err @ (CountError::InvalidItem(_)
                | CountError::InvalidTenant(_)
                | CountError::InvalidAddress(_)),
            ) => (StatusCode::BAD_REQUEST, err.to_string(), "input_error"),
            WebError::Count(err @ CountError::NoWorkersReady) => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.to_string(),
                "no_workers_ready",
            ),
            WebError::Count(err @ CountError::WorkerUnreachable { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                err.to_string(),
                "worker_unreachable",
            ),
            WebError::Count(err @ (CountError::Io(_) | CountError::Serialization(_))) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "storage_error",
            ),
            WebError::Count(err @ CountError::Config(_)) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "config_error",
            ),
            WebError::Count(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "internal_error",
            ),
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error"),
        }
    }

    /// Status and JSON body bytes, for callers that assemble responses by hand.
    pub fn to_status_and_body(self) -> (StatusCode, Vec<u8>) {
        let (status, error, code) = self.parts();
        let body = ErrorResponse {
            error,
            code: code.to_string(),
        };
        (status, serde_json::to_vec(&body).unwrap_or_default())
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, error, code) = self.parts();
        let body = Json(ErrorResponse {
            error,
            code: code.to_string(),
        });
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
