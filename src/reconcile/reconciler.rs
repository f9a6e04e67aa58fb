//! Change application against the routing tree.
//!
//! The reconciler is the single writer: every structural mutation of
//! the tree and every balancer membership edit flows through
//! [`Reconciler::apply`]. It keeps its own view of the declared config,
//! updated as changes land, so upstream fan-out never re-reads the
//! store mid-change.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::model::{EndpointSpec, HostSpec, LocationSpec, UpstreamSpec};
use crate::routing::{Endpoint, HostRouter, LocationBalancer, PathRouter, RoutingError};

use super::change::{Action, Change};

/// What `host/create` does when the host already exists.
///
/// `Replace` installs a fresh empty router, discarding the host's
/// locations; `IgnoreExisting` leaves the present router untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HostCreatePolicy {
    #[default]
    Replace,
    IgnoreExisting,
}

/// A change that could not be applied. The change is dropped; the tree
/// keeps its prior state for the entity involved.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("host {host} not found")]
    HostNotFound { host: String },

    #[error("location {location} not found under host {host}")]
    LocationNotFound { host: String, location: String },

    #[error("location {location} already present under host {host}")]
    DuplicateLocation { host: String, location: String },

    #[error("path {path} already routed under host {host}")]
    DuplicatePath { host: String, path: String },

    #[error(transparent)]
    Endpoint(#[from] RoutingError),
}

#[derive(Default)]
struct DeclaredHost {
    locations: HashMap<String, DeclaredLocation>,
}

struct DeclaredLocation {
    path: String,
    upstream: String,
}

/// Applies typed changes to the routing tree.
pub struct Reconciler {
    tree: Arc<HostRouter>,
    declared: HashMap<String, DeclaredHost>,
    policy: HostCreatePolicy,
}

impl Reconciler {
    pub fn new(tree: Arc<HostRouter>) -> Self {
        Self::with_policy(tree, HostCreatePolicy::default())
    }

    pub fn with_policy(tree: Arc<HostRouter>, policy: HostCreatePolicy) -> Self {
        Self {
            tree,
            declared: HashMap::new(),
            policy,
        }
    }

    /// Applies one change to completion. Errors mean the change was
    /// dropped without partial mutation; the caller logs and continues.
    pub fn apply(&mut self, change: Change) -> Result<(), ApplyError> {
        match change {
            Change::Host { action, host } => match action {
                Action::Create => self.add_host(&host),
                Action::Delete => self.delete_host(&host),
            },
            Change::Location {
                action,
                host,
                location,
            } => match action {
                Action::Create => self.add_location(&host, &location),
                Action::Delete => self.delete_location(&host, &location),
            },
            Change::Endpoint {
                action,
                upstream,
                endpoint,
            } => match action {
                Action::Create => self.add_endpoint(&upstream, &endpoint),
                Action::Delete => self.delete_endpoint(&upstream, &endpoint),
            },
        }
    }

    fn add_host(&mut self, host: &HostSpec) -> Result<(), ApplyError> {
        if self.tree.contains(&host.name) && self.policy == HostCreatePolicy::IgnoreExisting {
            tracing::debug!(host = %host.name, "host already present, ignoring create");
            return Ok(());
        }
        self.tree.set_router(&host.name, Arc::new(PathRouter::new()));
        self.declared.insert(host.name.clone(), DeclaredHost::default());
        tracing::info!(host = %host.name, "installed host");
        Ok(())
    }

    fn delete_host(&mut self, host: &HostSpec) -> Result<(), ApplyError> {
        self.tree.remove_router(&host.name);
        self.declared.remove(&host.name);
        tracing::info!(host = %host.name, "removed host");
        Ok(())
    }

    fn add_location(&mut self, host: &HostSpec, loc: &LocationSpec) -> Result<(), ApplyError> {
        let router = self.tree.get_router(&host.name).ok_or_else(|| ApplyError::HostNotFound {
            host: host.name.clone(),
        })?;
        if router.get_by_id(&loc.name).is_some() {
            return Err(ApplyError::DuplicateLocation {
                host: host.name.clone(),
                location: loc.name.clone(),
            });
        }

        let balancer = Arc::new(LocationBalancer::new(&loc.name));
        router
            .add(&loc.path, Arc::clone(&balancer))
            .map_err(|_| ApplyError::DuplicatePath {
                host: host.name.clone(),
                path: loc.path.clone(),
            })?;

        // Populate from the upstream carried on the change. A failing
        // endpoint does not unwind the location; the balancer may start
        // partially filled, or empty if the upstream has no endpoints.
        for spec in &loc.upstream.endpoints {
            match Endpoint::from_url(&spec.name, &spec.url) {
                Ok(endpoint) => {
                    if let Err(error) = balancer.add(endpoint) {
                        tracing::warn!(
                            location = %loc.name,
                            endpoint = %spec.name,
                            %error,
                            "failed to register endpoint"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(endpoint = %spec.name, %error, "skipping unparseable endpoint");
                }
            }
        }

        self.declared
            .entry(host.name.clone())
            .or_default()
            .locations
            .insert(
                loc.name.clone(),
                DeclaredLocation {
                    path: loc.path.clone(),
                    upstream: loc.upstream.name.clone(),
                },
            );
        tracing::info!(
            host = %host.name,
            location = %loc.name,
            path = %loc.path,
            upstream = %loc.upstream.name,
            members = balancer.len(),
            "installed location"
        );
        Ok(())
    }

    fn delete_location(&mut self, host: &HostSpec, loc: &LocationSpec) -> Result<(), ApplyError> {
        let router = self.tree.get_router(&host.name).ok_or_else(|| ApplyError::HostNotFound {
            host: host.name.clone(),
        })?;
        let balancer = router.get_by_id(&loc.name).ok_or_else(|| ApplyError::LocationNotFound {
            host: host.name.clone(),
            location: loc.name.clone(),
        })?;
        router.remove(&balancer);
        if let Some(declared) = self.declared.get_mut(&host.name) {
            declared.locations.remove(&loc.name);
        }
        tracing::info!(host = %host.name, location = %loc.name, "removed location");
        Ok(())
    }

    fn add_endpoint(&mut self, upstream: &UpstreamSpec, spec: &EndpointSpec) -> Result<(), ApplyError> {
        let endpoint = Endpoint::from_url(&spec.name, &spec.url)?;
        for balancer in self.balancers_for_upstream(&upstream.name) {
            match balancer.add(endpoint.clone()) {
                Ok(()) => {
                    tracing::info!(location = %balancer.id(), endpoint = %endpoint, "added endpoint");
                }
                // Re-create of a present endpoint is tolerated as a no-op.
                Err(RoutingError::DuplicateEndpoint { .. }) => {
                    tracing::debug!(
                        location = %balancer.id(),
                        endpoint = %spec.name,
                        "endpoint already registered"
                    );
                }
                Err(error) => {
                    tracing::warn!(location = %balancer.id(), %error, "failed to add endpoint");
                }
            }
        }
        Ok(())
    }

    fn delete_endpoint(&mut self, upstream: &UpstreamSpec, spec: &EndpointSpec) -> Result<(), ApplyError> {
        // Removal is identity-only; the endpoint's URL plays no part.
        for balancer in self.balancers_for_upstream(&upstream.name) {
            match balancer.remove(&spec.name) {
                Ok(()) => {
                    tracing::info!(location = %balancer.id(), endpoint = %spec.name, "removed endpoint");
                }
                Err(error) => {
                    tracing::warn!(location = %balancer.id(), %error, "failed to remove endpoint");
                }
            }
        }
        Ok(())
    }

    /// Every balancer behind a location that references `upstream`,
    /// resolved through the declared view and the tree. One failing
    /// lookup does not hide the other consumers.
    fn balancers_for_upstream(&self, upstream: &str) -> Vec<Arc<LocationBalancer>> {
        let mut out = Vec::new();
        for (host, declared) in &self.declared {
            for (name, loc) in &declared.locations {
                if loc.upstream != upstream {
                    continue;
                }
                let Some(router) = self.tree.get_router(host) else {
                    tracing::error!(%host, "declared host missing from tree");
                    continue;
                };
                match router.get_by_pattern(&loc.path) {
                    Some(balancer) => out.push(balancer),
                    None => {
                        tracing::error!(%host, location = %name, path = %loc.path, "declared location missing from tree");
                    }
                }
            }
        }
        out
    }
}
