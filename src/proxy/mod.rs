//! Service call forwarding.
//!
//! # Data Flow
//! ```text
//! RequestDescriptor + RouteParams
//!     → resolve_target (AddressResolver + inbound query)
//!     → sync.rs      : transport.rs forward, await, relay ForwardResult
//!     → detached.rs  : DetachedContext::detach → tokio::spawn(transport.rs forward) → log
//! ```

pub mod detached;
pub mod sync;
pub mod transport;

pub use detached::{AsyncForwarder, DetachedContext};
pub use sync::SyncForwarder;
pub use transport::Transport;

use url::Url;

use crate::routing::{AddressResolver, ResolveError, RouteParams};

/// Service URL for `params`, with the inbound query string carried over.
pub fn resolve_target(
    resolver: &AddressResolver,
    params: &RouteParams,
    query: Option<&str>,
) -> Result<Url, ResolveError> {
    let mut target = resolver.resolve(params)?;
    target.set_query(query);
    Ok(target)
}
