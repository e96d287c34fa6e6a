//! Request handling and transformation.
//!
//! # Responsibilities
//! - Buffer the inbound request into a [`RequestDescriptor`]
//! - Attach the server-side trace context
//! - Prepare headers for forwarding to an internal service
//!
//! # Design Decisions
//! - The body is drained before any handler runs, so nothing downstream
//!   depends on the client connection staying open
//! - Body size is capped by `DefaultBodyLimit` (413 when exceeded)
//! - Hop-by-hop headers are connection-scoped and never forwarded

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};

use crate::error::GatewayError;
use crate::observability::TraceContext;

/// Headers that only describe the client connection.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// Normalized, fully buffered view of an inbound call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Server span of the inbound request.
    pub trace: TraceContext,
}

impl RequestDescriptor {
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    pub fn header_str(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Headers to send upstream: everything except `host` and hop-by-hop headers.
    pub fn forward_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers.iter() {
            if name == header::HOST || is_hop_by_hop(name) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        headers
    }

    /// Header multimap as `name -> [values...]`, lowercase names.
    pub fn headers_as_map(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in self.headers.iter() {
            map.entry(name.as_str().to_string())
                .or_default()
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        map
    }
}

impl<S> FromRequest<S> for RequestDescriptor
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();
        let headers = req.headers().clone();
        let trace = req
            .extensions()
            .get::<TraceContext>()
            .copied()
            .unwrap_or_else(TraceContext::new_root);

        let body = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                GatewayError::PayloadTooLarge.into_response()
            } else {
                rejection.into_response()
            }
        })?;

        Ok(Self {
            method,
            uri,
            headers,
            body,
            trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;
    use axum::extract::DefaultBodyLimit;
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;

    fn descriptor(headers: HeaderMap) -> RequestDescriptor {
        RequestDescriptor {
            method: Method::GET,
            uri: Uri::from_static("/ns/svc/x?a=1"),
            headers,
            body: Bytes::new(),
            trace: TraceContext::new_root(),
        }
    }

    #[test]
    fn forward_headers_drop_host_and_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.example.com"));
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.append("x-multi", HeaderValue::from_static("a"));
        headers.append("x-multi", HeaderValue::from_static("b"));

        let forwarded = descriptor(headers).forward_headers();
        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(header::CONNECTION).is_none());
        assert!(forwarded.get(header::TRANSFER_ENCODING).is_none());
        let multi: Vec<_> = forwarded.get_all("x-multi").iter().collect();
        assert_eq!(multi, vec!["a", "b"]);
    }

    #[test]
    fn header_map_keeps_every_value() {
        let mut headers = HeaderMap::new();
        headers.append("X-Hook", HeaderValue::from_static("1"));
        headers.append("x-hook", HeaderValue::from_static("2"));
        headers.insert(header::USER_AGENT, HeaderValue::from_static("curl/8"));

        let map = descriptor(headers).headers_as_map();
        assert_eq!(map["x-hook"], vec!["1", "2"]);
        assert_eq!(map["user-agent"], vec!["curl/8"]);
        assert_eq!(descriptor(HeaderMap::new()).query(), Some("a=1"));
    }

    #[tokio::test]
    async fn extractor_buffers_body_and_keeps_trace() {
        let parent = TraceContext::new_root();
        let app = Router::new().route(
            "/",
            post(move |d: RequestDescriptor| async move {
                assert_eq!(d.trace, parent);
                assert_eq!(d.method, Method::POST);
                String::from_utf8(d.body.to_vec()).unwrap()
            }),
        );

        let mut request = axum::http::Request::post("/").body(Body::from("hello")).unwrap();
        request.extensions_mut().insert(parent);
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[tokio::test]
    async fn extractor_rejects_oversized_body() {
        let app = Router::new()
            .route("/", post(|_d: RequestDescriptor| async { "ok" }))
            .layer(DefaultBodyLimit::max(4));

        let request = axum::http::Request::post("/")
            .body(Body::from("too large"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
