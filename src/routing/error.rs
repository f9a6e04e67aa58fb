//! Routing and balancer error types.

use thiserror::Error;

/// Errors from balancer membership and path registration.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Endpoint URL did not parse.
    #[error("invalid endpoint url '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Endpoint URL parsed but carries no host component.
    #[error("endpoint url '{url}' has no host")]
    MissingHost { url: String },

    /// Endpoint id already registered with this balancer.
    #[error("endpoint {id} already registered")]
    DuplicateEndpoint { id: String },

    /// Endpoint id not registered with this balancer.
    #[error("endpoint {id} not registered")]
    EndpointNotFound { id: String },

    /// Balancer has no members to pick from.
    #[error("no endpoints available")]
    NoEndpoints,

    /// Path pattern already routed under this host.
    #[error("path {path} already routed")]
    DuplicatePath { path: String },
}

/// Request dispatch failures, mapped to HTTP 404 by the forwarding layer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MatchError {
    #[error("no router for host {host}")]
    UnknownHost { host: String },

    #[error("no location matches path {path} under host {host}")]
    NoMatchingPath { host: String, path: String },
}
