//! Fire-and-forget forwarding.
//!
//! # Responsibilities
//! - Hand a fully buffered request to a background task and return at once
//! - Carry the trace identity into that task, and nothing else
//! - Log the outcome, which no caller ever sees
//!
//! # Design Decisions
//! - One spawned task per call; no queue, no concurrency cap, no retry
//! - The task is not tied to the inbound connection: axum dropping the
//!   handler future on disconnect does not reach it
//! - Each task runs under its own deadline (`timeouts.async_forward_secs`)

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::error::GatewayError;
use crate::http::request::RequestDescriptor;
use crate::lifecycle::tasks::InFlightTracker;
use crate::observability::{GatewayMetrics, TraceContext};
use crate::proxy::{resolve_target, transport::Transport};
use crate::routing::{AddressResolver, RouteParams};

/// Top-level scope for work that outlives the request that started it.
///
/// Built only through [`DetachedContext::detach`]: the trace identity is
/// copied by value and a fresh deadline replaces the request's own timeout
/// and cancellation.
#[derive(Debug, Clone, Copy)]
pub struct DetachedContext {
    trace: TraceContext,
    deadline: Duration,
}

impl DetachedContext {
    pub fn detach(trace: &TraceContext, deadline: Duration) -> Self {
        Self {
            trace: *trace,
            deadline,
        }
    }

    pub fn trace(&self) -> TraceContext {
        self.trace
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// Accepts a request, forwards it in the background.
#[derive(Clone)]
pub struct AsyncForwarder {
    transport: Transport,
    resolver: AddressResolver,
    metrics: GatewayMetrics,
    tasks: InFlightTracker,
    deadline: Duration,
}

impl AsyncForwarder {
    pub fn new(
        transport: Transport,
        resolver: AddressResolver,
        metrics: GatewayMetrics,
        tasks: InFlightTracker,
        deadline: Duration,
    ) -> Self {
        Self {
            transport,
            resolver,
            metrics,
            tasks,
            deadline,
        }
    }

    /// Spawn the forward. Only resolution can fail here; everything after
    /// the spawn is logged.
    pub fn dispatch(
        &self,
        params: &RouteParams,
        descriptor: RequestDescriptor,
    ) -> Result<JoinHandle<()>, GatewayError> {
        self.metrics.record_async_invoke();
        let target = resolve_target(&self.resolver, params, descriptor.query())?;

        let scope = DetachedContext::detach(&descriptor.trace, self.deadline);
        let span = tracing::info_span!(
            parent: None,
            "async_forward",
            method = %descriptor.method,
            target = %target,
            trace_id = %scope.trace().trace_id(),
        );
        span.follows_from(&tracing::Span::current());

        let guard = self.tasks.track();
        let transport = self.transport.clone();
        let descriptor = RequestDescriptor {
            trace: scope.trace(),
            ..descriptor
        };

        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                match transport.forward(&target, &descriptor, scope.deadline()).await {
                    Ok(result) => {
                        tracing::info!(status = %result.status, "Async forward completed")
                    }
                    Err(e) => tracing::error!(error = %e, "Async forward failed"),
                }
            }
            .instrument(span),
        );

        Ok(handle)
    }
}
