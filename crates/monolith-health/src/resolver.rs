//! Sticky endpoint resolution for one service.
//!
//! Health checks and data calls use the cache differently:
//!
//! ```text
//! resolve_for_health_check   always scan from the primary, then cache
//! resolve_for_data_call      try the cached address only
//!                              └── on failure: scan the rest, cache or clear
//! ```
//!
//! The health check is what moves a service back to its primary once the
//! primary recovers. Data calls stay on whatever worked last.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use monolith_core::{EndpointSet, Prober};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::failover::{self, FailoverOutcome};

/// The address a service was last reached at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub address: String,
    pub index: usize,
    pub cached_at: DateTime<Utc>,
}

/// Per-service resolver owning the sticky cache.
pub struct StickyResolver {
    endpoints: EndpointSet,
    prober: Arc<dyn Prober>,
    timeout: Duration,
    /// Held across the whole read-probe-write sequence.
    cache: Mutex<Option<ResolvedEndpoint>>,
}

impl StickyResolver {
    pub fn new(endpoints: EndpointSet, prober: Arc<dyn Prober>, timeout: Duration) -> Self {
        Self {
            endpoints,
            prober,
            timeout,
            cache: Mutex::new(None),
        }
    }

    pub fn endpoints(&self) -> &EndpointSet {
        &self.endpoints
    }

    pub fn service_id(&self) -> &str {
        self.endpoints.service_id()
    }

    /// Full primary-first scan; caches the winner or clears the cache.
    pub async fn resolve_for_health_check(&self) -> FailoverOutcome {
        let mut cache = self.cache.lock().await;
        let outcome = failover::probe(&self.endpoints, self.prober.as_ref(), 0, self.timeout).await;
        self.store(&mut cache, &outcome);
        outcome
    }

    /// Reuse the cached address; fall back to a full scan only if it fails.
    pub async fn resolve_for_data_call(&self) -> FailoverOutcome {
        let mut cache = self.cache.lock().await;

        let Some(cached) = cache.clone() else {
            let outcome =
                failover::probe(&self.endpoints, self.prober.as_ref(), 0, self.timeout).await;
            self.store(&mut cache, &outcome);
            return outcome;
        };

        let sticky =
            failover::probe_single(&self.endpoints, self.prober.as_ref(), cached.index, self.timeout)
                .await;
        if sticky.reachable() {
            return sticky;
        }

        if self.endpoints.len() == 1 {
            self.store(&mut cache, &sticky);
            return sticky;
        }

        // The rescan leaves out the address that just failed.
        debug!(service = %self.service_id(), address = %cached.address, "cached endpoint failed, rescanning");
        let mut outcome = failover::probe_skipping(
            &self.endpoints,
            self.prober.as_ref(),
            cached.index,
            self.timeout,
        )
        .await;
        self.store(&mut cache, &outcome);

        let mut attempted = sticky.attempted;
        attempted.append(&mut outcome.attempted);
        outcome.attempted = attempted;
        outcome
    }

    /// The currently cached endpoint, if any.
    pub async fn cached(&self) -> Option<ResolvedEndpoint> {
        self.cache.lock().await.clone()
    }

    pub async fn cached_address(&self) -> Option<String> {
        self.cache.lock().await.as_ref().map(|c| c.address.clone())
    }

    fn store(&self, cache: &mut Option<ResolvedEndpoint>, outcome: &FailoverOutcome) {
        if !outcome.reachable() {
            if cache.take().is_some() {
                debug!(service = %self.service_id(), "endpoint cache cleared");
            }
            return;
        }

        let switched = cache
            .as_ref()
            .is_some_and(|c| c.index != outcome.index);
        if switched {
            info!(
                service = %self.service_id(),
                address = %outcome.address(),
                index = outcome.index,
                "active endpoint changed"
            );
        }
        *cache = Some(ResolvedEndpoint {
            address: outcome.address().to_string(),
            index: outcome.index,
            cached_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::tests::{Script, ScriptedProber, endpoints};

    fn resolver(prober: &Arc<ScriptedProber>, addrs: &[&str]) -> StickyResolver {
        StickyResolver::new(endpoints(addrs), prober.clone(), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn health_check_returns_to_primary_once_it_recovers() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Down), ("B", Script::Up)]));
        let resolver = resolver(&prober, &["A", "B"]);

        let outcome = resolver.resolve_for_health_check().await;
        assert_eq!(outcome.address(), "B");
        assert_eq!(resolver.cached_address().await.as_deref(), Some("B"));

        prober.set("A", Script::Up);
        let outcome = resolver.resolve_for_health_check().await;
        assert_eq!(outcome.address(), "A");
        assert_eq!(resolver.cached_address().await.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn data_call_sticks_to_cached_backup() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Down), ("B", Script::Up)]));
        let resolver = resolver(&prober, &["A", "B"]);
        resolver.resolve_for_health_check().await;

        // Primary is back, but data calls keep using the backup.
        prober.set("A", Script::Up);
        prober.clear_calls();
        let outcome = resolver.resolve_for_data_call().await;
        assert_eq!(outcome.address(), "B");
        assert_eq!(prober.calls(), vec!["B"]);
    }

    #[tokio::test]
    async fn data_call_falls_back_to_full_scan() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Down), ("B", Script::Up)]));
        let resolver = resolver(&prober, &["A", "B"]);
        resolver.resolve_for_health_check().await;

        prober.set("A", Script::Up);
        prober.set("B", Script::Down);
        prober.clear_calls();
        let outcome = resolver.resolve_for_data_call().await;
        assert_eq!(outcome.address(), "A");
        assert_eq!(outcome.attempted, vec!["B", "A"]);
        assert_eq!(resolver.cached_address().await.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn rescan_does_not_retry_failed_cached_address() {
        let prober = Arc::new(ScriptedProber::new(&[
            ("A", Script::Down),
            ("B", Script::Up),
            ("C", Script::Down),
        ]));
        let resolver = resolver(&prober, &["A", "B", "C"]);
        resolver.resolve_for_health_check().await;
        assert_eq!(resolver.cached_address().await.as_deref(), Some("B"));

        prober.set("B", Script::Hang);
        prober.set("C", Script::Up);
        prober.clear_calls();
        let outcome = resolver.resolve_for_data_call().await;
        assert_eq!(outcome.address(), "C");
        assert_eq!(outcome.attempted, vec!["B", "A", "C"]);
        assert_eq!(prober.calls(), vec!["B", "A", "C"]);
        assert_eq!(resolver.cached_address().await.as_deref(), Some("C"));
    }

    #[tokio::test]
    async fn single_endpoint_data_call_probes_once() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Up)]));
        let resolver = resolver(&prober, &["A"]);
        resolver.resolve_for_data_call().await;

        prober.set("A", Script::Down);
        prober.clear_calls();
        let outcome = resolver.resolve_for_data_call().await;
        assert!(!outcome.reachable());
        assert_eq!(prober.calls(), vec!["A"]);
        assert_eq!(resolver.cached().await, None);
    }

    #[tokio::test]
    async fn data_call_clears_cache_when_everything_fails() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Up)]));
        let resolver = resolver(&prober, &["A", "B"]);
        resolver.resolve_for_data_call().await;
        assert_eq!(resolver.cached_address().await.as_deref(), Some("A"));

        prober.set("A", Script::Down);
        let outcome = resolver.resolve_for_data_call().await;
        assert!(!outcome.reachable());
        assert_eq!(resolver.cached().await, None);
    }

    #[tokio::test]
    async fn cache_never_points_at_failed_address() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Up), ("B", Script::Up)]));
        let resolver = resolver(&prober, &["A", "B"]);
        resolver.resolve_for_health_check().await;

        prober.set("A", Script::Down);
        resolver.resolve_for_health_check().await;
        let cached = resolver.cached().await.unwrap();
        assert_eq!(cached.address, "B");
        assert_eq!(cached.index, 1);
    }
}
