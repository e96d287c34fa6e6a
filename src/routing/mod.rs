//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound path  /{ns}/{ksvc}/{*path}     /eventing/{ns}/{broker}
//!     → RouteParams                      → BrokerParams
//!     → AddressResolver::resolve         → BrokerResolver::resolve
//!     → http://{ksvc}.{ns}.svc.cluster.local/{path}
//!                                        → {broker_ingress}/{ns}/{broker}
//! ```
//!
//! # Design Decisions
//! - Route table itself is static (see `http::server`); this module only
//!   turns extracted parameters into addresses
//! - Deterministic: same input always resolves to the same URL

pub mod resolver;

pub use resolver::{AddressResolver, BrokerParams, BrokerResolver, ResolveError, RouteParams};
