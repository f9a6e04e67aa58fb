//! Balancer-facing endpoint values.
//!
//! An endpoint pairs a caller-provided identity with a parsed URL.
//! Balancers equate endpoints by id, never by URL, so deletion works
//! even when the current URL is unknown to the caller.

use std::fmt;

use url::Url;

use super::error::RoutingError;

/// A backend target with a stable identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    id: String,
    url: Url,
}

impl Endpoint {
    /// Parses `raw` and attaches `id` verbatim.
    ///
    /// Fails on malformed URLs and on URLs without a host component.
    pub fn from_url(id: impl Into<String>, raw: &str) -> Result<Self, RoutingError> {
        let url = Url::parse(raw).map_err(|source| RoutingError::InvalidUrl {
            url: raw.to_string(),
            source,
        })?;
        if url.host_str().is_none() {
            return Err(RoutingError::MissingHost {
                url: raw.to_string(),
            });
        }
        Ok(Self { id: id.into(), url })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// `host:port` of the backend, with the scheme default port filled in.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Whether the backend expects TLS, from the URL scheme.
    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "https"
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint(id={}, url={})", self.id, self.url)
    }
}
