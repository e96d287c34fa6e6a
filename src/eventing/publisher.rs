//! Event publishing to namespace brokers.
//!
//! # Data Flow
//! ```text
//! RequestDescriptor → Event::from_request → fresh id
//!     → BrokerResolver ({ingress}/{ns}/{broker})
//!     → EventBus::send (child traceparent)
//!     → DeliveryOutcome → 202 {id} | 502
//! ```

use std::sync::Arc;

use crate::error::GatewayError;
use crate::eventing::bus::{DeliveryOutcome, DeliveryTarget, EventBus};
use crate::eventing::envelope::{new_event_id, Event};
use crate::http::request::RequestDescriptor;
use crate::http::response::Published;
use crate::observability::{GatewayMetrics, TraceContext};
use crate::routing::{BrokerParams, BrokerResolver};

#[derive(Clone)]
pub struct EventPublisher {
    bus: Arc<dyn EventBus>,
    brokers: BrokerResolver,
    metrics: GatewayMetrics,
}

impl EventPublisher {
    pub fn new(bus: Arc<dyn EventBus>, brokers: BrokerResolver, metrics: GatewayMetrics) -> Self {
        Self {
            bus,
            brokers,
            metrics,
        }
    }

    /// Publish the CloudEvent carried by an inbound request.
    ///
    /// The inbound id is validated and then replaced: every accepted call
    /// yields a distinct id.
    pub async fn publish_request(
        &self,
        params: &BrokerParams,
        descriptor: &RequestDescriptor,
    ) -> Result<Published, GatewayError> {
        let mut event = Event::from_request(descriptor)?;
        event.id = new_event_id();
        self.deliver(params, event, &descriptor.trace).await
    }

    /// Send one event to the broker named by `params`.
    pub async fn deliver(
        &self,
        params: &BrokerParams,
        event: Event,
        trace: &TraceContext,
    ) -> Result<Published, GatewayError> {
        let target = DeliveryTarget {
            url: self.brokers.resolve(params)?,
            trace: trace.child(),
        };

        let outcome = self.bus.send(&target, &event).await;
        self.metrics.record_publish(&outcome);

        match outcome {
            DeliveryOutcome::Delivered => {
                tracing::debug!(
                    event_id = %event.id,
                    event_type = %event.ty,
                    broker = %target.url,
                    "Event delivered"
                );
                Ok(Published { id: event.id })
            }
            DeliveryOutcome::Undelivered(reason) => {
                tracing::warn!(event_id = %event.id, broker = %target.url, %reason, "Event undelivered");
                Err(GatewayError::Undelivered(reason))
            }
            DeliveryOutcome::Nacked { status, reason } => {
                tracing::warn!(event_id = %event.id, broker = %target.url, status, "Event nacked");
                Err(GatewayError::Nacked { status, reason })
            }
        }
    }
}
