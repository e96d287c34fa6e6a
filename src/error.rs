//! Error types for the gateway.
//!
//! Two families: [`GatewayError`] is raised while serving a request and maps
//! onto a response; [`StartupError`] aborts construction before the listener
//! accepts traffic.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::config::ConfigError;
use crate::observability::metrics::MetricsError;
use crate::routing::ResolveError;

/// Request-scoped failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Pass-through publish with a malformed CloudEvent.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// Webhook body that is not JSON.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,

    #[error("address resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("reading upstream response body failed: {0}")]
    UpstreamBody(String),

    #[error("upstream timed out after {0:?}")]
    UpstreamTimeout(Duration),

    #[error("event undelivered: {0}")]
    Undelivered(String),

    #[error("event rejected by broker with status {status}: {reason}")]
    Nacked { status: u16, reason: String },
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidEvent(_) | GatewayError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Resolve(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream(_)
            | GatewayError::UpstreamBody(_)
            | GatewayError::Undelivered(_)
            | GatewayError::Nacked { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "Request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "Request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Failure while building the gateway.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metric registration failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error("address resolver misconfigured: {0}")]
    Resolve(#[from] ResolveError),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Render an error with its `source()` chain, e.g.
/// `client error (Connect): tcp connect error: Connection refused`.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
