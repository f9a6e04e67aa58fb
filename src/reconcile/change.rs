//! Typed reconciliation events.
//!
//! A change is a tagged variant with three arms, each carrying its
//! typed parent: a location change names its host, an endpoint change
//! names its upstream, a host change has no parent.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::model::{EndpointSpec, HostSpec, LocationSpec, UpstreamSpec};

/// The two actions a store delta can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Delete,
}

/// Action string the store sent that is neither `create` nor `delete`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown change action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Self::Create),
            "delete" => Ok(Self::Delete),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// A configuration delta streamed from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Host {
        action: Action,
        host: HostSpec,
    },
    Location {
        action: Action,
        host: HostSpec,
        location: LocationSpec,
    },
    Endpoint {
        action: Action,
        upstream: UpstreamSpec,
        endpoint: EndpointSpec,
    },
}

impl Change {
    pub fn host(action: Action, host: HostSpec) -> Self {
        Self::Host { action, host }
    }

    pub fn location(action: Action, host: HostSpec, location: LocationSpec) -> Self {
        Self::Location {
            action,
            host,
            location,
        }
    }

    pub fn endpoint(action: Action, upstream: UpstreamSpec, endpoint: EndpointSpec) -> Self {
        Self::Endpoint {
            action,
            upstream,
            endpoint,
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host { action, host } => write!(f, "{} host {}", action, host.name),
            Self::Location {
                action,
                host,
                location,
            } => write!(f, "{} location {}/{}", action, host.name, location.name),
            Self::Endpoint {
                action,
                upstream,
                endpoint,
            } => write!(f, "{} endpoint {}/{}", action, upstream.name, endpoint.name),
        }
    }
}
