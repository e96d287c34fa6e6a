//! HTTP server setup and dispatch.
//!
//! # Responsibilities
//! - Build every collaborator once, from validated configuration
//! - Declare the static route table and the ordered layer stack
//! - Serve until shutdown, then drain detached forwards
//!
//! # Design Decisions
//! - Handlers only see injected collaborators ([`AppState`]); nothing global
//! - Layers, outermost first: panic recovery, request id, trace context,
//!   request span, overall timeout, body limit
//! - The overall timeout sits one second above the upstream deadline so
//!   an upstream overrun answers 504, not 408

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{any, get, post},
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::validation::validate_config;
use crate::config::{ConfigError, GatewayConfig};
use crate::error::{GatewayError, StartupError};
use crate::eventing::{EventBus, EventPublisher, HttpEventBus, WebhookTranslator};
use crate::http::request::RequestDescriptor;
use crate::lifecycle::tasks::InFlightTracker;
use crate::observability::tracing::{make_request_span, trace_context_middleware};
use crate::observability::GatewayMetrics;
use crate::proxy::{AsyncForwarder, SyncForwarder, Transport};
use crate::routing::resolver::strip_segments;
use crate::routing::{AddressResolver, BrokerParams, BrokerResolver, RouteParams};

/// Collaborators injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub sync: SyncForwarder,
    pub detached: AsyncForwarder,
    pub publisher: EventPublisher,
    pub webhook: WebhookTranslator,
}

/// `{ns}/{ksvc}` path parameters; the remainder is taken from the raw path.
#[derive(Debug, Deserialize)]
struct ServiceSegments {
    ns: String,
    ksvc: String,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    metrics: GatewayMetrics,
    tasks: InFlightTracker,
}

impl HttpServer {
    /// Build the server with the HTTP event bus.
    pub fn new(config: GatewayConfig) -> Result<Self, StartupError> {
        let bus = HttpEventBus::new(&config.timeouts)
            .map_err(|e| StartupError::Client(e.to_string()))?;
        Self::with_event_bus(config, Arc::new(bus))
    }

    /// Build the server around a caller-supplied event bus.
    pub fn with_event_bus(
        config: GatewayConfig,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, StartupError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let metrics = GatewayMetrics::new(&config.observability.metrics_prefix)?;
        let addresses = AddressResolver::new(&config.upstream)?;
        let brokers = BrokerResolver::new(&config.eventing)?;
        let transport = Transport::new(&config.upstream, &config.timeouts)?;
        let tasks = InFlightTracker::new(metrics.clone());

        let publisher = EventPublisher::new(bus, brokers, metrics.clone());
        let state = AppState {
            sync: SyncForwarder::new(
                transport.clone(),
                addresses.clone(),
                metrics.clone(),
                Duration::from_secs(config.timeouts.request_secs),
            ),
            detached: AsyncForwarder::new(
                transport,
                addresses,
                metrics.clone(),
                tasks.clone(),
                Duration::from_secs(config.timeouts.async_forward_secs),
            ),
            webhook: WebhookTranslator::new(publisher.clone(), metrics.clone()),
            publisher,
        };

        let router = build_router(&config, state);
        Ok(Self {
            router,
            config,
            metrics,
            tasks,
        })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn metrics(&self) -> GatewayMetrics {
        self.metrics.clone()
    }

    pub fn in_flight(&self) -> InFlightTracker {
        self.tasks.clone()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Serve on `listener` until `shutdown` fires, then wait up to
    /// `timeouts.drain_secs` for detached forwards.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        let pending = self.tasks.active_count();
        if pending > 0 {
            tracing::info!(pending, "Draining async forwards");
            let drain = Duration::from_secs(self.config.timeouts.drain_secs);
            if !self.tasks.drain(drain).await {
                tracing::warn!(
                    abandoned = self.tasks.active_count(),
                    "Drain deadline reached, abandoning async forwards"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Route table and layer stack.
#[allow(deprecated)]
pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
    let request_timeout = Duration::from_secs(config.timeouts.request_secs.saturating_add(1));

    Router::new()
        .route("/", get(liveness))
        .route("/{ns}/{ksvc}", any(sync_invoke))
        .route("/{ns}/{ksvc}/", any(sync_invoke))
        .route("/{ns}/{ksvc}/{*path}", any(sync_invoke))
        .route("/async/{ns}/{ksvc}", any(async_invoke))
        .route("/async/{ns}/{ksvc}/", any(async_invoke))
        .route("/async/{ns}/{ksvc}/{*path}", any(async_invoke))
        .route("/eventing/{ns}/{broker}", post(publish_event))
        .route("/eventing/{ns}/{broker}/webhook", post(translate_webhook))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
        .layer(middleware::from_fn(trace_context_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CatchPanicLayer::new())
}

async fn liveness() -> &'static str {
    "OK"
}

async fn sync_invoke(
    State(state): State<AppState>,
    Path(segments): Path<ServiceSegments>,
    descriptor: RequestDescriptor,
) -> Result<impl IntoResponse, GatewayError> {
    let path = strip_segments(descriptor.uri.path(), 2);
    let params = RouteParams::new(segments.ns, segments.ksvc, path);
    state.sync.forward(&params, &descriptor).await
}

async fn async_invoke(
    State(state): State<AppState>,
    Path(segments): Path<ServiceSegments>,
    descriptor: RequestDescriptor,
) -> Result<StatusCode, GatewayError> {
    let path = strip_segments(descriptor.uri.path(), 3);
    let params = RouteParams::new(segments.ns, segments.ksvc, path);
    state.detached.dispatch(&params, descriptor)?;
    Ok(StatusCode::ACCEPTED)
}

async fn publish_event(
    State(state): State<AppState>,
    Path(params): Path<BrokerParams>,
    descriptor: RequestDescriptor,
) -> Result<impl IntoResponse, GatewayError> {
    state.publisher.publish_request(&params, &descriptor).await
}

async fn translate_webhook(
    State(state): State<AppState>,
    Path(params): Path<BrokerParams>,
    descriptor: RequestDescriptor,
) -> Result<impl IntoResponse, GatewayError> {
    state.webhook.handle(&params, &descriptor).await
}
