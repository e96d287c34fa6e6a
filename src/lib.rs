//! Knative Gateway
//!
//! HTTP front door for a Knative cluster: forwards calls to Knative services
//! (synchronously or detached) and publishes CloudEvents to namespace brokers.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────────┐
//!                         │                    KNATIVE GATEWAY                   │
//!                         │                                                      │
//!     Client Request      │  ┌──────────┐    ┌──────────┐    ┌───────────────┐   │
//!     ────────────────────┼─▶│  http    │───▶│ routing  │───▶│ proxy         │───┼──▶ {ksvc}.{ns}.svc
//!                         │  │  server  │    │ resolver │    │ sync/detached │   │
//!                         │  └────┬─────┘    └──────────┘    └───────────────┘   │
//!                         │       │                                              │
//!                         │       │          ┌──────────────────────────────┐    │
//!                         │       └─────────▶│ eventing                     │────┼──▶ broker ingress
//!                         │                  │ envelope/webhook → publisher │    │
//!                         │                  └──────────────────────────────┘    │
//!                         │                                                      │
//!                         │  ┌────────────────────────────────────────────────┐  │
//!                         │  │ config │ observability │ lifecycle │ error     │  │
//!                         │  └────────────────────────────────────────────────┘  │
//!                         └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod eventing;
pub mod http;
pub mod proxy;
pub mod routing;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::{GatewayError, StartupError};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
