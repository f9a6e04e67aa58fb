//! Per-location round-robin balancer.
//!
//! Membership and the rotation cursor live behind one mutex, so a pick
//! is atomic with respect to concurrent add/remove: it returns an owned
//! copy of a currently-registered endpoint or `NoEndpoints`, never a
//! reference to a just-removed member.

use std::sync::{Mutex, PoisonError};

use super::endpoint::Endpoint;
use super::error::RoutingError;

/// Round-robin pool of endpoints behind one location.
///
/// Carries the owning location's name as its identity; the path router
/// looks balancers up by it.
#[derive(Debug)]
pub struct LocationBalancer {
    id: String,
    state: Mutex<Rotation>,
}

#[derive(Debug, Default)]
struct Rotation {
    members: Vec<Endpoint>,
    cursor: usize,
}

impl LocationBalancer {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(Rotation::default()),
        }
    }

    /// The owning location's name.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Registers an endpoint. Adding an already-present id fails and
    /// leaves membership untouched.
    pub fn add(&self, endpoint: Endpoint) -> Result<(), RoutingError> {
        let mut state = self.lock();
        if state.members.iter().any(|m| m.id() == endpoint.id()) {
            return Err(RoutingError::DuplicateEndpoint {
                id: endpoint.id().to_string(),
            });
        }
        // Appending never disturbs the cursor; the rotation order of
        // existing members is preserved.
        state.members.push(endpoint);
        Ok(())
    }

    /// Removes an endpoint by id. Removing an absent id fails without
    /// affecting other members.
    pub fn remove(&self, id: &str) -> Result<(), RoutingError> {
        let mut state = self.lock();
        let idx = state
            .members
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| RoutingError::EndpointNotFound { id: id.to_string() })?;
        state.members.remove(idx);
        // Keep the cursor on the member that would have been picked
        // next. Removing at the cursor leaves it pointing at the
        // successor, which has shifted into the removed slot.
        if idx < state.cursor {
            state.cursor -= 1;
        }
        if state.cursor >= state.members.len() {
            state.cursor = 0;
        }
        Ok(())
    }

    /// Picks the next member under round-robin ordering.
    pub fn pick(&self) -> Result<Endpoint, RoutingError> {
        let mut state = self.lock();
        if state.members.is_empty() {
            return Err(RoutingError::NoEndpoints);
        }
        let idx = state.cursor % state.members.len();
        state.cursor = (idx + 1) % state.members.len();
        Ok(state.members[idx].clone())
    }

    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().members.is_empty()
    }

    /// Current member ids, in rotation order.
    pub fn member_ids(&self) -> Vec<String> {
        self.lock()
            .members
            .iter()
            .map(|m| m.id().to_string())
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Rotation> {
        // Membership operations cannot leave the state inconsistent, so
        // a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
