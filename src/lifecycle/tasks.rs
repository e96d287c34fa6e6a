//! In-flight tracking for detached background work.
//!
//! # Responsibilities
//! - Count detached async forwards that are still running
//! - Mirror the count into the `async_in_flight` gauge
//! - Let shutdown wait (bounded) for them to finish

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::observability::GatewayMetrics;

/// Tracks detached tasks for graceful shutdown.
#[derive(Clone)]
pub struct InFlightTracker {
    active_count: Arc<AtomicU64>,
    metrics: GatewayMetrics,
}

impl InFlightTracker {
    pub fn new(metrics: GatewayMetrics) -> Self {
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
            metrics,
        }
    }

    /// Record a new task. Returns a guard that decrements on drop.
    pub fn track(&self) -> TaskGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        self.metrics.async_started();
        TaskGuard {
            active_count: Arc::clone(&self.active_count),
            metrics: self.metrics.clone(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked task finished or `timeout` elapsed.
    /// Returns `true` when nothing is left running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        let wait = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }
}

/// Held by a running task; dropping it marks the task finished.
pub struct TaskGuard {
    active_count: Arc<AtomicU64>,
    metrics: GatewayMetrics,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        self.metrics.async_finished();
    }
}
