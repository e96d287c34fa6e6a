//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all subsystems in dependency order
//! - Start background tasks (metrics endpoint, signal watcher)
//! - Bind listeners and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and typed
//! - Listeners bind last (traffic only when ready)

use tokio::net::TcpListener;

use crate::config::GatewayConfig;
use crate::error::StartupError;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics::serve_metrics;

/// Build the gateway from `config` and serve until a termination signal.
pub async fn run(config: GatewayConfig) -> Result<(), StartupError> {
    let server = HttpServer::new(config)?;
    let config = server.config().clone();

    tracing::info!(
        bind_address = %config.listener.bind_address,
        cluster_domain = %config.upstream.cluster_domain,
        broker_ingress = %config.eventing.broker_ingress,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();

    let metrics_task = if config.observability.metrics_enabled {
        let metrics_listener = TcpListener::bind(&config.observability.metrics_address).await?;
        let metrics = server.metrics();
        let rx = shutdown.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = serve_metrics(metrics_listener, metrics, rx).await {
                tracing::error!(error = %e, "Metrics endpoint failed");
            }
        }))
    } else {
        None
    };

    let server_rx = shutdown.subscribe();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    let served = server.run(listener, server_rx).await;

    // The server may stop without a signal; release the metrics endpoint too.
    shutdown.trigger();
    if let Some(task) = metrics_task {
        let _ = task.await;
    }
    served?;

    tracing::info!("Shutdown complete");
    Ok(())
}
