//! In-memory routing tree and per-location balancing.
//!
//! Two mutable levels sit between a request and a backend: hostname to
//! path router, path pattern to balancer. The reconciler is the only
//! writer; request handlers read through shared handles.

mod balancer;
mod endpoint;
mod error;
mod host_router;
mod path_router;

pub use balancer::LocationBalancer;
pub use endpoint::Endpoint;
pub use error::{MatchError, RoutingError};
pub use host_router::HostRouter;
pub use path_router::PathRouter;
