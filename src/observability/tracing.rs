//! Distributed tracing support.
//!
//! # Responsibilities
//! - Extract trace context from incoming requests
//! - Propagate trace context to backend requests
//! - Create spans for gateway operations
//!
//! # Design Decisions
//! - Supports W3C Trace Context (`traceparent`) headers
//! - Every inbound request gets a server span id; outbound calls get a child of it
//! - Context lives in request extensions, never in process-wide state

use std::fmt;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use rand::Rng;

/// W3C trace context header.
pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");

const VERSION: &str = "00";
const FLAG_SAMPLED: u8 = 0x01;

/// 16-byte trace identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId([u8; 16]);

/// 8-byte span identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId([u8; 8]);

impl TraceId {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let bytes: [u8; 16] = rng.gen();
            if bytes != [0; 16] {
                return Self(bytes);
            }
        }
    }
}

impl SpanId {
    fn random() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let bytes: [u8; 8] = rng.gen();
            if bytes != [0; 8] {
                return Self(bytes);
            }
        }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{:02x}", b)?;
    }
    Ok(())
}

fn parse_hex<const N: usize>(s: &str) -> Option<[u8; N]> {
    if s.len() != N * 2 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let mut out = [0u8; N];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let pair = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(pair, 16).ok()?;
    }
    Some(out)
}

/// Trace identity of one span, copied by value across task boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: TraceId,
    span_id: SpanId,
    sampled: bool,
}

impl TraceContext {
    /// Start a new trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: TraceId::random(),
            span_id: SpanId::random(),
            sampled: true,
        }
    }

    /// A new span in the same trace, parented by `self`.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            span_id: SpanId::random(),
            sampled: self.sampled,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Parse a `traceparent` value.
    ///
    /// Unknown future versions are accepted as long as the first four fields
    /// follow the version 00 layout. Version `ff` and all-zero ids are invalid.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || version.eq_ignore_ascii_case("ff") {
            return None;
        }
        if version == VERSION && parts.next().is_some() {
            return None;
        }
        parse_hex::<1>(version)?;

        let trace_id = parse_hex::<16>(trace_id)?;
        let span_id = parse_hex::<8>(span_id)?;
        let [flags] = parse_hex::<1>(flags)?;
        if trace_id == [0; 16] || span_id == [0; 8] {
            return None;
        }

        Some(Self {
            trace_id: TraceId(trace_id),
            span_id: SpanId(span_id),
            sampled: flags & FLAG_SAMPLED != 0,
        })
    }

    /// Read the remote parent from request headers, if present and valid.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get(TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
    }

    pub fn to_header_value(&self) -> HeaderValue {
        // Only hex digits and dashes.
        HeaderValue::from_str(&self.to_string()).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// Write this context as the `traceparent` of an outbound request.
    pub fn inject(&self, headers: &mut HeaderMap) {
        headers.insert(TRACEPARENT, self.to_header_value());
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = if self.sampled { FLAG_SAMPLED } else { 0 };
        write!(f, "{}-{}-{}-{:02x}", VERSION, self.trace_id, self.span_id, flags)
    }
}

/// Middleware that assigns the server span for the request.
///
/// The span continues the caller's trace when a valid `traceparent` is
/// present, and starts a new trace otherwise.
pub async fn trace_context_middleware(mut request: Request<Body>, next: Next) -> Response {
    let context = TraceContext::from_headers(request.headers())
        .map(|parent| parent.child())
        .unwrap_or_else(TraceContext::new_root);
    request.extensions_mut().insert(context);
    next.run(request).await
}

/// Builds the per-request `tracing` span for `tower_http::trace::TraceLayer`.
pub fn make_request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id().to_string())
        .unwrap_or_default();

    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
        trace_id = %trace_id,
    )
}
