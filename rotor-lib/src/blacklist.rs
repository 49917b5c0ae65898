//! Time-bounded disqualification of endpoints that failed to connect or
//! passed reachability checks.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::endpoint::Endpoint;

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Mutually-exclusive registry of blacklisted endpoint names. `Instant` is
/// used instead of wall-clock time so the TTL is immune to clock skew.
pub struct BlacklistRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl BlacklistRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(DEFAULT_TTL)
    }

    /// Records `now` against `name`, overwriting any prior entry.
    pub fn add(&self, name: &str, now: Instant) {
        self.entries.lock().unwrap().insert(name.to_string(), now);
        tracing::warn!(endpoint = name, ttl = ?self.ttl, "blacklisted endpoint");
    }

    /// True iff an unexpired entry exists for `name`. Evicts the entry as a
    /// side effect if it has expired.
    pub fn is_blocked(&self, name: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(name) {
            Some(&blocked_at) if now.saturating_duration_since(blocked_at) < self.ttl => true,
            Some(_) => {
                entries.remove(name);
                false
            }
            None => false,
        }
    }

    /// Returns the subset of `endpoints` that are not currently blocked.
    pub fn filter<'a>(&self, endpoints: &'a [Endpoint], now: Instant) -> Vec<&'a Endpoint> {
        endpoints.iter().filter(|e| !self.is_blocked(&e.name, now)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unblocked_endpoint_passes_through() {
        let registry = BlacklistRegistry::new(Duration::from_secs(60));
        assert!(!registry.is_blocked("a", Instant::now()));
    }

    #[test]
    fn blocked_endpoint_is_blocked_until_ttl_elapses() {
        let registry = BlacklistRegistry::new(Duration::from_secs(60));
        let t0 = Instant::now();
        registry.add("a", t0);

        assert!(registry.is_blocked("a", t0));
        assert!(registry.is_blocked("a", t0 + Duration::from_secs(59)));
        assert!(!registry.is_blocked("a", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let registry = BlacklistRegistry::new(Duration::from_secs(1));
        let t0 = Instant::now();
        registry.add("a", t0);
        assert!(!registry.is_blocked("a", t0 + Duration::from_secs(2)));

        // re-adding after eviction starts a fresh TTL window
        registry.add("a", t0 + Duration::from_secs(2));
        assert!(registry.is_blocked("a", t0 + Duration::from_secs(2)));
    }

    #[test]
    fn filter_excludes_blocked_endpoints() {
        let registry = BlacklistRegistry::new(Duration::from_secs(60));
        let now = Instant::now();
        registry.add("a", now);

        let endpoints = vec![
            Endpoint {
                name: "a".into(),
                country: "se".into(),
                config_reference: "/a".into(),
            },
            Endpoint {
                name: "b".into(),
                country: "us".into(),
                config_reference: "/b".into(),
            },
        ];

        let available = registry.filter(&endpoints, now);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name, "b");
    }
}
