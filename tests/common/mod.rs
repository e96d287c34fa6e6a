//! Shared utilities for integration tests: a gateway on an ephemeral port
//! plus mock Knative services and a mock broker ingress.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use tokio::net::TcpListener;

use knative_gateway::config::GatewayConfig;
use knative_gateway::lifecycle::InFlightTracker;
use knative_gateway::{HttpServer, Shutdown};

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct Captured {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Fixed answer of a mock backend.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: &'static [u8],
    pub delay: Duration,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/plain",
            body: b"ok",
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            ..Self::ok()
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// HTTP backend that records every request once it has answered it.
pub struct MockBackend {
    pub addr: SocketAddr,
    captured: Arc<Mutex<Vec<Captured>>>,
}

impl MockBackend {
    pub async fn start(reply: Reply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(Vec::new()));

        let log = captured.clone();
        let app = Router::new().fallback(move |request: Request<Body>| {
            let log = log.clone();
            let reply = reply.clone();
            async move {
                let (parts, body) = request.into_parts();
                let body = to_bytes(body, usize::MAX).await.unwrap();
                tokio::time::sleep(reply.delay).await;
                log.lock().unwrap().push(Captured {
                    method: parts.method,
                    path_and_query: parts
                        .uri
                        .path_and_query()
                        .map(|pq| pq.as_str().to_string())
                        .unwrap_or_default(),
                    headers: parts.headers,
                    body,
                });
                (
                    reply.status,
                    [("content-type", reply.content_type)],
                    reply.body,
                )
                    .into_response()
            }
        });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, captured }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn captured(&self) -> Vec<Captured> {
        self.captured.lock().unwrap().clone()
    }

    /// Poll until `count` requests were answered or `timeout` passed.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.captured.lock().unwrap().len() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Config that routes `{service}.default.svc.cluster.local` to
/// `127.0.0.1:{service_port}` and publishes to `broker_url`.
pub fn gateway_config(service_port: u16, services: &[&str], broker_url: &str) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.upstream.port = Some(service_port);
    for service in services {
        config.upstream.resolve.insert(
            format!("{}.default.svc.cluster.local", service),
            "127.0.0.1".into(),
        );
    }
    config.eventing.broker_ingress = broker_url.to_string();
    config.observability.metrics_enabled = false;
    config.timeouts.connect_secs = 2;
    config
}

/// A gateway serving on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub in_flight: InFlightTracker,
    shutdown: Shutdown,
    handle: tokio::task::JoinHandle<()>,
}

impl TestGateway {
    pub async fn start(config: GatewayConfig) -> Self {
        let server = HttpServer::new(config).unwrap();
        let in_flight = server.in_flight();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();

        let handle = tokio::spawn(async move {
            server.run(listener, rx).await.unwrap();
        });

        Self {
            addr,
            in_flight,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server (including its drain) to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(15), self.handle).await;
    }
}
