//! Pingora ProxyHttp implementation over the routing tree.
//!
//! One dispatch per inbound request: hostname to path router to
//! balancer, then a round-robin pick. A missing host or path maps to
//! HTTP 404, an empty endpoint pool to HTTP 503. The tree is read-only
//! from here; all mutation happens in the reconciler task.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use pingora_core::prelude::*;
use pingora_core::upstreams::peer::HttpPeer;
use pingora_proxy::{ProxyHttp, Session};

use crate::routing::{Endpoint, HostRouter};

/// Per-request context.
#[derive(Default)]
pub struct GatewayCtx {
    /// Endpoint chosen for this request, kept for access logging.
    pub endpoint_id: Option<String>,
}

/// Gateway proxy forwarding requests to reconciled backends.
pub struct GatewayProxy {
    tree: Arc<HostRouter>,
}

impl GatewayProxy {
    pub fn new(tree: Arc<HostRouter>) -> Self {
        Self { tree }
    }

    /// Builds an HttpPeer from a picked endpoint.
    fn endpoint_to_peer(endpoint: &Endpoint) -> Result<HttpPeer> {
        let addr = parse_endpoint_address(&endpoint.authority())
            .map_err(|e| Error::explain(ErrorType::InternalError, e))?;
        let sni = endpoint.url().host_str().unwrap_or_default().to_string();
        Ok(HttpPeer::new(addr, endpoint.is_tls(), sni))
    }
}

#[async_trait]
impl ProxyHttp for GatewayProxy {
    type CTX = GatewayCtx;

    fn new_ctx(&self) -> Self::CTX {
        GatewayCtx::default()
    }

    async fn upstream_peer(
        &self,
        session: &mut Session,
        ctx: &mut Self::CTX,
    ) -> Result<Box<HttpPeer>> {
        let host_header = session
            .req_header()
            .headers
            .get("host")
            .and_then(|v| v.to_str().ok());
        let authority = session.req_header().uri.authority().map(|a| a.as_str());

        let host = extract_host_for_routing(host_header, authority);
        let path = session.req_header().uri.path();

        let balancer = self
            .tree
            .dispatch(&host, path)
            .map_err(|e| Error::explain(ErrorType::HTTPStatus(404), e.to_string()))?;

        let endpoint = balancer.pick().map_err(|e| {
            Error::explain(
                ErrorType::HTTPStatus(503),
                format!("location {}: {}", balancer.id(), e),
            )
        })?;

        ctx.endpoint_id = Some(endpoint.id().to_string());

        let peer = Self::endpoint_to_peer(&endpoint)?;
        Ok(Box::new(peer))
    }

    async fn logging(&self, session: &mut Session, _e: Option<&Error>, ctx: &mut Self::CTX) {
        let status = session
            .response_written()
            .map(|r| r.status.as_u16())
            .unwrap_or(0);

        let method = session.req_header().method.as_str();
        let path = session.req_header().uri.path();
        let endpoint = ctx.endpoint_id.as_deref().unwrap_or("-");

        tracing::info!(
            method = method,
            path = path,
            status = status,
            endpoint = endpoint,
            "request completed"
        );
    }
}

/// Parses an endpoint authority into a SocketAddr.
///
/// Endpoint URLs are expected to carry `IP:PORT` authorities
/// (e.g., "192.168.1.1:8080" or "[::1]:8080").
pub fn parse_endpoint_address(authority: &str) -> Result<SocketAddr, String> {
    authority
        .parse::<SocketAddr>()
        .map_err(|e| format!("invalid endpoint address '{}': {}", authority, e))
}

/// Extracts the host for routing from request headers.
///
/// Priority:
/// 1. Host header (preferred)
/// 2. :authority pseudo-header (HTTP/2 fallback)
///
/// Port is stripped if present.
/// Returns empty string if neither is available.
pub fn extract_host_for_routing(host_header: Option<&str>, authority: Option<&str>) -> String {
    let raw_host = host_header.or(authority).unwrap_or("");

    // Handle IPv6: [::1]:8080 -> [::1]
    if raw_host.starts_with('[') {
        if let Some(bracket_end) = raw_host.find(']') {
            return raw_host[..=bracket_end].to_string();
        }
    }

    // Regular host:port -> host
    raw_host
        .rsplit_once(':')
        .map(|(host, _)| host.to_string())
        .unwrap_or_else(|| raw_host.to_string())
}
