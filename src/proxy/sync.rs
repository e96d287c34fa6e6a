//! Synchronous forwarding: forward, wait, relay.

use std::time::Duration;

use crate::error::GatewayError;
use crate::http::request::RequestDescriptor;
use crate::http::response::ForwardResult;
use crate::observability::GatewayMetrics;
use crate::proxy::{resolve_target, transport::Transport};
use crate::routing::{AddressResolver, RouteParams};

/// Forwards a request to an internal service and returns its answer unchanged.
#[derive(Clone)]
pub struct SyncForwarder {
    transport: Transport,
    resolver: AddressResolver,
    metrics: GatewayMetrics,
    timeout: Duration,
}

impl SyncForwarder {
    pub fn new(
        transport: Transport,
        resolver: AddressResolver,
        metrics: GatewayMetrics,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            resolver,
            metrics,
            timeout,
        }
    }

    /// One attempt. Transport failures become 502, deadline overruns 504.
    pub async fn forward(
        &self,
        params: &RouteParams,
        descriptor: &RequestDescriptor,
    ) -> Result<ForwardResult, GatewayError> {
        self.metrics.record_sync_invoke();
        let target = resolve_target(&self.resolver, params, descriptor.query())?;
        tracing::debug!(target = %target, method = %descriptor.method, "Sync invoke");
        self.transport.forward(&target, descriptor, self.timeout).await
    }
}
