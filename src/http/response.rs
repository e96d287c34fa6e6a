//! Response handling and transformation.
//!
//! # Responsibilities
//! - Relay an upstream response to the client byte for byte
//! - Build the fixed acknowledgement responses (202, publish id)
//!
//! # Design Decisions
//! - Only status, content type and body are relayed; upstream headers are not
//! - Bodies are fully buffered; the relay never rewrites them

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Upstream answer of a synchronous forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardResult {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl IntoResponse for ForwardResult {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        if let Some(content_type) = self.content_type {
            response.headers_mut().insert(header::CONTENT_TYPE, content_type);
        }
        response
    }
}

/// Body of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Published {
    pub id: String,
}

impl IntoResponse for Published {
    fn into_response(self) -> Response {
        (StatusCode::ACCEPTED, Json(self)).into_response()
    }
}
