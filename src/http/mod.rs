//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (layer stack, route table)
//!     → request.rs (buffer body, attach trace context)
//!     → proxy / eventing handlers
//!     → response.rs (relay upstream answer or acknowledge)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::RequestDescriptor;
pub use response::{ForwardResult, Published};
pub use server::{build_router, AppState, HttpServer};
