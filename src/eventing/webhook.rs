//! Inbound webhook to event translation.
//!
//! Any JSON payload posted to `/eventing/{ns}/{broker}/webhook` is wrapped in
//! a synthetic CloudEvent together with the request headers and published
//! like a pass-through event.

use serde_json::{json, Value};

use crate::error::GatewayError;
use crate::eventing::envelope::Event;
use crate::eventing::publisher::EventPublisher;
use crate::http::request::RequestDescriptor;
use crate::http::response::Published;
use crate::observability::GatewayMetrics;
use crate::routing::BrokerParams;

pub const WEBHOOK_EVENT_TYPE: &str = "Webhook";

/// Event source when the caller sends no `User-Agent`.
pub const DEFAULT_WEBHOOK_SOURCE: &str = "knative-gateway";

/// Build the webhook event for `descriptor`.
///
/// An empty `User-Agent` counts as absent.
pub fn translate(descriptor: &RequestDescriptor) -> Result<Event, GatewayError> {
    let payload: Value = serde_json::from_slice(&descriptor.body)
        .map_err(|e| GatewayError::InvalidPayload(e.to_string()))?;

    let source = descriptor
        .header_str(axum::http::header::USER_AGENT)
        .map(str::trim)
        .filter(|agent| !agent.is_empty())
        .unwrap_or(DEFAULT_WEBHOOK_SOURCE);

    Ok(Event::new(source, WEBHOOK_EVENT_TYPE).with_json_data(json!({
        "headers": descriptor.headers_as_map(),
        "body": payload,
    })))
}

#[derive(Clone)]
pub struct WebhookTranslator {
    publisher: EventPublisher,
    metrics: GatewayMetrics,
}

impl WebhookTranslator {
    pub fn new(publisher: EventPublisher, metrics: GatewayMetrics) -> Self {
        Self { publisher, metrics }
    }

    pub async fn handle(
        &self,
        params: &BrokerParams,
        descriptor: &RequestDescriptor,
    ) -> Result<Published, GatewayError> {
        self.metrics.record_webhook_invoke();
        let event = translate(descriptor)?;
        tracing::debug!(event_id = %event.id, source = %event.source, "Webhook translated");
        self.publisher.deliver(params, event, &descriptor.trace).await
    }
}
