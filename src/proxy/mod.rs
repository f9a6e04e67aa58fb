//! Forwarding-layer adapter.
//!
//! Wraps the routing tree in Pingora's ProxyHttp trait and maps
//! dispatch and pick failures to HTTP status codes.

mod gateway;

pub use gateway::GatewayProxy;
