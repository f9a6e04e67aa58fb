//! Hostname-level routing.
//!
//! Maps hostnames to per-host path routers. Hostnames are normalized to
//! lowercase on every operation, so `Example.COM` and `example.com`
//! address the same router.

use std::sync::Arc;

use dashmap::DashMap;

use super::balancer::LocationBalancer;
use super::error::MatchError;
use super::path_router::PathRouter;

/// Two-level routing tree: hostname to path router to balancer.
///
/// Readers dispatch concurrently while the reconciler mutates; each
/// lookup step is atomic on its own, there is no cross-step snapshot.
pub struct HostRouter {
    routers: DashMap<String, Arc<PathRouter>>,
}

impl HostRouter {
    pub fn new() -> Self {
        Self {
            routers: DashMap::new(),
        }
    }

    /// Installs or replaces the path router for `hostname`. The
    /// reconciler only ever installs fresh routers or removes them, so
    /// a replacement implies the previous one is dropped.
    pub fn set_router(&self, hostname: &str, router: Arc<PathRouter>) {
        self.routers.insert(normalize(hostname), router);
    }

    pub fn get_router(&self, hostname: &str) -> Option<Arc<PathRouter>> {
        self.routers.get(&normalize(hostname)).map(|r| Arc::clone(&r))
    }

    /// Unconditional removal; absent hostnames are a no-op.
    pub fn remove_router(&self, hostname: &str) {
        self.routers.remove(&normalize(hostname));
    }

    pub fn contains(&self, hostname: &str) -> bool {
        self.routers.contains_key(&normalize(hostname))
    }

    pub fn host_count(&self) -> usize {
        self.routers.len()
    }

    /// One lookup per inbound request: hostname, then path.
    pub fn dispatch(&self, host: &str, path: &str) -> Result<Arc<LocationBalancer>, MatchError> {
        let router = self.get_router(host).ok_or_else(|| MatchError::UnknownHost {
            host: host.to_string(),
        })?;
        router.find_match(path).ok_or_else(|| MatchError::NoMatchingPath {
            host: host.to_string(),
            path: path.to_string(),
        })
    }
}

impl Default for HostRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(hostname: &str) -> String {
    hostname.to_lowercase()
}
