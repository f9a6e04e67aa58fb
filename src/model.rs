//! Declared configuration entities.
//!
//! These are the wire-level shapes the config store serves: a host owns
//! locations, an upstream owns endpoints, and a location references its
//! upstream by name. Cross-references are names, not pointers; the
//! reconciler resolves them explicitly.

use serde::{Deserialize, Serialize};

/// A single backend target inside an upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub name: String,
    pub url: String,
}

/// A named group of interchangeable backend endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamSpec {
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<EndpointSpec>,
}

/// A path rule within a host. Change payloads carry the referenced
/// upstream inline, endpoints included, so applying a location never
/// goes back to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    pub name: String,
    pub path: String,
    pub upstream: UpstreamSpec,
}

/// A virtual host and its path rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSpec {
    pub name: String,
    #[serde(default)]
    pub locations: Vec<LocationSpec>,
}

impl HostSpec {
    /// A host with no locations yet.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locations: Vec::new(),
        }
    }
}

impl UpstreamSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            endpoints: Vec::new(),
        }
    }
}
