//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Build server → Bind listeners → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain async forwards → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - Draining has a deadline: detached work still running after it is abandoned

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod tasks;

pub use shutdown::Shutdown;
pub use tasks::{InFlightTracker, TaskGuard};
