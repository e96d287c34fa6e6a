use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use knative_gateway::config::{load_config, GatewayConfig};
use knative_gateway::error::error_chain;
use knative_gateway::lifecycle::startup;
use knative_gateway::observability::logging;

/// HTTP gateway for Knative services and brokers.
#[derive(Debug, Parser)]
#[command(name = "knative-gateway", version, about)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("failed to load {}: {}", path.display(), error_chain(&e));
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "knative-gateway starting");

    match startup::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %error_chain(&e), "Gateway failed");
            ExitCode::FAILURE
        }
    }
}
