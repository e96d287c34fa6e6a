//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Register the gateway's counters once, at startup
//! - Hand the handles to the components that increment them
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `{prefix}_sync_invoke_total` (counter): synchronous forwards started
//! - `{prefix}_async_invoke_total` (counter): detached forwards dispatched
//! - `{prefix}_webhook_invoke_total` (counter): webhook translations
//! - `{prefix}_event_publish_total{outcome}` (counter): publish results
//! - `{prefix}_async_in_flight` (gauge): detached forwards still running
//!
//! # Design Decisions
//! - The Prometheus recorder is built explicitly and never installed as the
//!   process-wide recorder; every handle is passed down by the server
//! - Low-overhead metric updates (atomic operations)

use axum::{extract::State, routing::get, Router};
use metrics::{Counter, Gauge, Key, Label, Level, Metadata, Recorder};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::eventing::DeliveryOutcome;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("invalid metric name '{0}'")]
    InvalidName(String),
}

/// Prometheus metric name rule: `[a-zA-Z_:][a-zA-Z0-9_:]*`.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

/// Counters and gauges shared by every handler.
#[derive(Clone)]
pub struct GatewayMetrics {
    sync_invoke: Counter,
    async_invoke: Counter,
    webhook_invoke: Counter,
    publish_delivered: Counter,
    publish_undelivered: Counter,
    publish_nacked: Counter,
    async_in_flight: Gauge,
    handle: PrometheusHandle,
}

impl GatewayMetrics {
    /// Build a private recorder and register every metric under `prefix`.
    pub fn new(prefix: &str) -> Result<Self, MetricsError> {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));

        let counter = |suffix: &str, labels: Vec<Label>| -> Result<Counter, MetricsError> {
            let name = format!("{}_{}", prefix, suffix);
            if !is_valid_metric_name(&name) {
                return Err(MetricsError::InvalidName(name));
            }
            Ok(recorder.register_counter(&Key::from_parts(name, labels), &metadata))
        };
        let outcome = |value: &'static str| vec![Label::new("outcome", value)];

        let sync_invoke = counter("sync_invoke_total", Vec::new())?;
        let async_invoke = counter("async_invoke_total", Vec::new())?;
        let webhook_invoke = counter("webhook_invoke_total", Vec::new())?;
        let publish_delivered = counter("event_publish_total", outcome("delivered"))?;
        let publish_undelivered = counter("event_publish_total", outcome("undelivered"))?;
        let publish_nacked = counter("event_publish_total", outcome("nacked"))?;

        let gauge_name = format!("{}_async_in_flight", prefix);
        if !is_valid_metric_name(&gauge_name) {
            return Err(MetricsError::InvalidName(gauge_name));
        }
        let async_in_flight = recorder.register_gauge(&Key::from_name(gauge_name), &metadata);

        Ok(Self {
            sync_invoke,
            async_invoke,
            webhook_invoke,
            publish_delivered,
            publish_undelivered,
            publish_nacked,
            async_in_flight,
            handle,
        })
    }

    pub fn record_sync_invoke(&self) {
        self.sync_invoke.increment(1);
    }

    pub fn record_async_invoke(&self) {
        self.async_invoke.increment(1);
    }

    pub fn record_webhook_invoke(&self) {
        self.webhook_invoke.increment(1);
    }

    pub fn record_publish(&self, outcome: &DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Delivered => self.publish_delivered.increment(1),
            DeliveryOutcome::Undelivered(_) => self.publish_undelivered.increment(1),
            DeliveryOutcome::Nacked { .. } => self.publish_nacked.increment(1),
        }
    }

    pub fn async_started(&self) {
        self.async_in_flight.increment(1.0);
    }

    pub fn async_finished(&self) {
        self.async_in_flight.decrement(1.0);
    }

    /// Current metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Serve `GET /metrics` until shutdown.
pub async fn serve_metrics(
    listener: TcpListener,
    metrics: GatewayMetrics,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let app = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics);

    tracing::info!(address = %listener.local_addr()?, "Metrics endpoint listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}

async fn render_metrics(State(metrics): State<GatewayMetrics>) -> String {
    metrics.render()
}
