//! Outbound HTTP transport for service calls.
//!
//! # Responsibilities
//! - Own the pooled hyper client shared by every forward
//! - Trace DNS resolution and TCP connect as their own spans
//! - Apply static host overrides before system DNS
//! - Send one request, buffer the full response, enforce a deadline
//!
//! # Design Decisions
//! - Single attempt; failures are reported, never retried
//! - The client sets `Host` from the target URI, so the inbound `Host` is dropped
//! - `traceparent` is rewritten to a child of the inbound server span

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    http::{header, Request, Uri},
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{
        connect::{
            dns::{GaiResolver, Name},
            HttpConnector,
        },
        Client,
    },
    rt::TokioExecutor,
};
use tower::Service;
use tracing::Instrument;
use url::Url;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::error::{error_chain, GatewayError, StartupError};
use crate::http::request::RequestDescriptor;
use crate::http::response::ForwardResult;
use crate::routing::ResolveError;

type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;

/// DNS hook: static overrides first, then `getaddrinfo`.
#[derive(Clone)]
pub struct TracedResolver {
    overrides: Arc<HashMap<String, IpAddr>>,
    inner: GaiResolver,
}

impl TracedResolver {
    pub fn new(overrides: HashMap<String, IpAddr>) -> Self {
        Self {
            overrides: Arc::new(overrides),
            inner: GaiResolver::new(),
        }
    }
}

impl Service<Name> for TracedResolver {
    type Response = std::vec::IntoIter<SocketAddr>;
    type Error = io::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, name: Name) -> Self::Future {
        let host = name.as_str().to_string();
        let span = tracing::debug_span!("dns", host = %host);

        if let Some(ip) = self.overrides.get(&host).copied() {
            return Box::pin(
                async move {
                    tracing::debug!(ip = %ip, "DNS override");
                    // Port 0 is replaced with the URI port by the connector.
                    Ok(vec![SocketAddr::new(ip, 0)].into_iter())
                }
                .instrument(span),
            );
        }

        let lookup = self.inner.call(name);
        Box::pin(
            async move {
                let start = Instant::now();
                match lookup.await {
                    Ok(addrs) => {
                        let addrs: Vec<SocketAddr> = addrs.collect();
                        tracing::debug!(
                            addresses = addrs.len(),
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "DNS resolved"
                        );
                        Ok(addrs.into_iter())
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "DNS lookup failed");
                        Err(e)
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// Connect hook around the hyper HTTP connector.
#[derive(Clone)]
pub struct TracedConnector {
    inner: HttpConnector<TracedResolver>,
}

impl TracedConnector {
    pub fn new(resolver: TracedResolver, connect_timeout: Duration) -> Self {
        let mut inner = HttpConnector::new_with_resolver(resolver);
        inner.set_connect_timeout(Some(connect_timeout));
        inner.set_nodelay(true);
        Self { inner }
    }
}

impl Service<Uri> for TracedConnector {
    type Response = <HttpConnector<TracedResolver> as Service<Uri>>::Response;
    type Error = <HttpConnector<TracedResolver> as Service<Uri>>::Error;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let span = tracing::debug_span!(
            "connect",
            host = dst.host().unwrap_or_default(),
            port = dst.port_u16().unwrap_or(80),
        );
        let connecting = self.inner.call(dst);
        Box::pin(
            async move {
                let start = Instant::now();
                let result = connecting.await;
                let elapsed_ms = start.elapsed().as_millis() as u64;
                match &result {
                    Ok(_) => tracing::debug!(elapsed_ms, "Connected"),
                    Err(e) => tracing::warn!(elapsed_ms, error = %e, "Connect failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}

/// Shared client for service calls.
#[derive(Clone)]
pub struct Transport {
    client: Client<TracedConnector, Body>,
}

impl Transport {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> Result<Self, StartupError> {
        let mut overrides = HashMap::with_capacity(upstream.resolve.len());
        for (host, ip) in &upstream.resolve {
            let ip: IpAddr = ip.parse().map_err(|_| {
                StartupError::Client(format!("invalid override address '{}' for {}", ip, host))
            })?;
            overrides.insert(host.to_ascii_lowercase(), ip);
        }

        let connector = TracedConnector::new(
            TracedResolver::new(overrides),
            Duration::from_secs(timeouts.connect_secs),
        );
        let client = Client::builder(TokioExecutor::new()).build(connector);
        Ok(Self { client })
    }

    /// Send `descriptor` to `target` and buffer the whole response.
    ///
    /// The deadline covers connect, response head and body.
    pub async fn forward(
        &self,
        target: &Url,
        descriptor: &RequestDescriptor,
        deadline: Duration,
    ) -> Result<ForwardResult, GatewayError> {
        let child = descriptor.trace.child();
        let span = tracing::info_span!(
            "forward",
            method = %descriptor.method,
            target = %target,
            trace_id = %child.trace_id(),
            span_id = %child.span_id(),
        );

        let uri: Uri = target.as_str().parse().map_err(|e: axum::http::uri::InvalidUri| {
            ResolveError::InvalidUrl {
                url: target.to_string(),
                reason: e.to_string(),
            }
        })?;

        let mut request = Request::new(Body::from(descriptor.body.clone()));
        *request.method_mut() = descriptor.method.clone();
        *request.uri_mut() = uri;
        *request.headers_mut() = descriptor.forward_headers();
        child.inject(request.headers_mut());

        let exchange = async {
            let response = self
                .client
                .request(request)
                .await
                .map_err(|e| GatewayError::Upstream(error_chain(&e)))?;

            let (parts, body): (_, Incoming) = response.into_parts();
            let body = axum::body::to_bytes(Body::new(body), usize::MAX)
                .await
                .map_err(|e| GatewayError::UpstreamBody(error_chain(&e)))?;

            Ok::<_, GatewayError>(ForwardResult {
                status: parts.status,
                content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
                body,
            })
        };

        async move {
            let start = Instant::now();
            let result = match tokio::time::timeout(deadline, exchange).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::UpstreamTimeout(deadline)),
            };
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(forwarded) => {
                    tracing::debug!(status = %forwarded.status, bytes = forwarded.body.len(), elapsed_ms, "Upstream responded")
                }
                Err(e) => tracing::warn!(error = %e, elapsed_ms, "Upstream call failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use axum::body::Bytes;
    use axum::http::HeaderMap;
    use crate::observability::TraceContext;

    fn descriptor() -> RequestDescriptor {
        RequestDescriptor {
            method: Method::GET,
            uri: Uri::from_static("/ns/svc/"),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            trace: TraceContext::new_root(),
        }
    }

    #[test]
    fn rejects_invalid_override() {
        let mut upstream = UpstreamConfig::default();
        upstream.resolve.insert("a.b.svc.cluster.local".into(), "nope".into());
        assert!(matches!(
            Transport::new(&upstream, &TimeoutConfig::default()),
            Err(StartupError::Client(_))
        ));
    }

    #[tokio::test]
    async fn refused_connection_is_upstream_error() {
        // Grab a free port and close it again.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = Transport::new(&UpstreamConfig::default(), &TimeoutConfig::default()).unwrap();
        let target = Url::parse(&format!("http://127.0.0.1:{port}/")).unwrap();
        let err = transport
            .forward(&target, &descriptor(), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)), "{err}");
    }

    #[tokio::test]
    async fn override_resolves_cluster_name() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let app = axum::Router::new().fallback(|| async { "resolved" });
            axum::serve(listener, app).await.unwrap();
        });

        let mut upstream = UpstreamConfig::default();
        upstream
            .resolve
            .insert("echo.default.svc.cluster.local".into(), "127.0.0.1".into());
        let transport = Transport::new(&upstream, &TimeoutConfig::default()).unwrap();
        let target = Url::parse(&format!("http://echo.default.svc.cluster.local:{port}/")).unwrap();

        let result = transport
            .forward(&target, &descriptor(), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result.status, axum::http::StatusCode::OK);
        assert_eq!(&result.body[..], b"resolved");
    }
}
