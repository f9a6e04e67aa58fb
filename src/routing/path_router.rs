//! Path-pattern routing under one hostname.
//!
//! Entries map a path pattern to a location balancer. Request matching
//! is longest-prefix at segment boundaries: `/api` matches `/api` and
//! `/api/users` but not `/apikeys`, and `/api/v1` beats `/api`.
//! Patterns are unique, so matching is deterministic.

use std::sync::{Arc, PoisonError, RwLock};

use super::balancer::LocationBalancer;
use super::error::RoutingError;

struct PathEntry {
    pattern: String,
    balancer: Arc<LocationBalancer>,
}

/// Ordered set of `(pattern, balancer)` entries for one host.
pub struct PathRouter {
    entries: RwLock<Vec<PathEntry>>,
}

impl PathRouter {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Registers a balancer at `pattern`. Fails if the pattern is
    /// already present.
    pub fn add(&self, pattern: &str, balancer: Arc<LocationBalancer>) -> Result<(), RoutingError> {
        let mut entries = self.write();
        if entries.iter().any(|e| e.pattern == pattern) {
            return Err(RoutingError::DuplicatePath {
                path: pattern.to_string(),
            });
        }
        entries.push(PathEntry {
            pattern: pattern.to_string(),
            balancer,
        });
        Ok(())
    }

    /// Exact-pattern lookup, used by reconciliation.
    pub fn get_by_pattern(&self, pattern: &str) -> Option<Arc<LocationBalancer>> {
        self.read()
            .iter()
            .find(|e| e.pattern == pattern)
            .map(|e| Arc::clone(&e.balancer))
    }

    /// Lookup by the location name carried on the balancer.
    pub fn get_by_id(&self, location: &str) -> Option<Arc<LocationBalancer>> {
        self.read()
            .iter()
            .find(|e| e.balancer.id() == location)
            .map(|e| Arc::clone(&e.balancer))
    }

    /// Removes the entry whose balancer is identity-equal to `balancer`.
    /// Returns whether an entry was removed.
    pub fn remove(&self, balancer: &Arc<LocationBalancer>) -> bool {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|e| !Arc::ptr_eq(&e.balancer, balancer));
        entries.len() < before
    }

    /// Matches a request path to the balancer with the longest matching
    /// pattern. Same path against a stable router always yields the
    /// same balancer.
    pub fn find_match(&self, path: &str) -> Option<Arc<LocationBalancer>> {
        self.read()
            .iter()
            .filter(|e| prefix_matches(&e.pattern, path))
            .max_by_key(|e| e.pattern.len())
            .map(|e| Arc::clone(&e.balancer))
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<PathEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<PathEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for PathRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Prefix matching respecting segment boundaries.
/// /api matches /api, /api/, /api/users
/// /api does NOT match /apikeys (no segment boundary)
fn prefix_matches(prefix: &str, path: &str) -> bool {
    if path == prefix {
        return true;
    }
    if path.starts_with(prefix) {
        if prefix.ends_with('/') {
            return true;
        }
        return path[prefix.len()..].starts_with('/');
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balancer(id: &str) -> Arc<LocationBalancer> {
        Arc::new(LocationBalancer::new(id))
    }

    // ========== Phase 1: Registration ==========

    #[test]
    fn test_add_and_get_by_pattern() {
        let router = PathRouter::new();
        router.add("/api", balancer("api")).unwrap();

        let found = router.get_by_pattern("/api").unwrap();
        assert_eq!(found.id(), "api");
        assert!(router.get_by_pattern("/other").is_none());
    }

    #[test]
    fn test_add_duplicate_pattern_fails() {
        let router = PathRouter::new();
        router.add("/api", balancer("api")).unwrap();

        let err = router.add("/api", balancer("api2")).unwrap_err();
        assert!(matches!(err, RoutingError::DuplicatePath { ref path } if path == "/api"));
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_get_by_id() {
        let router = PathRouter::new();
        router.add("/api", balancer("api")).unwrap();
        router.add("/web", balancer("web")).unwrap();

        assert_eq!(router.get_by_id("web").unwrap().id(), "web");
        assert!(router.get_by_id("missing").is_none());
    }

    #[test]
    fn test_remove_by_balancer_identity() {
        let router = PathRouter::new();
        let api = balancer("api");
        router.add("/api", Arc::clone(&api)).unwrap();
        router.add("/web", balancer("web")).unwrap();

        assert!(router.remove(&api));
        assert!(router.get_by_pattern("/api").is_none());
        assert_eq!(router.len(), 1);

        // Already removed; a second removal is a no-op.
        assert!(!router.remove(&api));
    }

    #[test]
    fn test_remove_matches_identity_not_name() {
        let router = PathRouter::new();
        router.add("/api", balancer("api")).unwrap();

        // A different balancer with the same name is a different entry.
        let imposter = balancer("api");
        assert!(!router.remove(&imposter));
        assert_eq!(router.len(), 1);
    }

    // ========== Phase 2: Request Matching ==========

    #[test]
    fn test_match_exact_and_nested_paths() {
        let router = PathRouter::new();
        router.add("/api", balancer("api")).unwrap();

        assert_eq!(router.find_match("/api").unwrap().id(), "api");
        assert_eq!(router.find_match("/api/").unwrap().id(), "api");
        assert_eq!(router.find_match("/api/v1/users").unwrap().id(), "api");
        assert!(router.find_match("/other").is_none());
    }

    #[test]
    fn test_match_requires_segment_boundary() {
        let router = PathRouter::new();
        router.add("/api", balancer("api")).unwrap();

        assert!(router.find_match("/apikeys").is_none());
    }

    #[test]
    fn test_longest_pattern_wins() {
        let router = PathRouter::new();
        router.add("/api", balancer("short")).unwrap();
        router.add("/api/v1", balancer("long")).unwrap();

        assert_eq!(router.find_match("/api/v1/users").unwrap().id(), "long");
        assert_eq!(router.find_match("/api/v2").unwrap().id(), "short");
    }

    #[test]
    fn test_match_is_deterministic() {
        let router = PathRouter::new();
        router.add("/a", balancer("a")).unwrap();
        router.add("/a/b", balancer("ab")).unwrap();
        router.add("/a/b/c", balancer("abc")).unwrap();

        let first = router.find_match("/a/b/c/d").unwrap();
        for _ in 0..10 {
            assert!(Arc::ptr_eq(&first, &router.find_match("/a/b/c/d").unwrap()));
        }
    }

    #[test]
    fn test_match_after_remove_falls_back() {
        let router = PathRouter::new();
        router.add("/api", balancer("short")).unwrap();
        let long = balancer("long");
        router.add("/api/v1", Arc::clone(&long)).unwrap();

        assert_eq!(router.find_match("/api/v1/x").unwrap().id(), "long");
        router.remove(&long);
        assert_eq!(router.find_match("/api/v1/x").unwrap().id(), "short");
    }

    // ========== Phase 3: Prefix Semantics ==========

    #[test]
    fn test_prefix_matches_segment_rules() {
        assert!(prefix_matches("/api", "/api"));
        assert!(prefix_matches("/api", "/api/"));
        assert!(prefix_matches("/api", "/api/users"));
        assert!(prefix_matches("/api/", "/api/users"));
        assert!(!prefix_matches("/api", "/apikeys"));
        assert!(!prefix_matches("/api/v1", "/api"));
    }
}
