//! Per-service monitors and the registry that owns them.
//!
//! A `ServiceMonitor` bundles everything one service needs: its sticky
//! resolver, its transition tracker, its player tracker, and the sink
//! notifications go to. Each has its own locks; services never share state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use monolith_core::{
    ConfigError, ConfigResult, NotifierSink, Notification, PlayerJoinEvent, ServiceId,
    TransitionEvent,
};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::failover::FailoverOutcome;
use crate::players::PlayerTracker;
use crate::resolver::StickyResolver;
use crate::tracker::{HealthState, Observation, ServiceHealthState, TransitionTracker};

/// Outcome of one health check.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub outcome: FailoverOutcome,
    pub state: HealthState,
    pub transition: Option<TransitionEvent>,
}

pub struct ServiceMonitor {
    resolver: StickyResolver,
    /// Held for a whole health check so observations land in probe order.
    checks: Mutex<()>,
    tracker: Mutex<TransitionTracker>,
    players: Mutex<PlayerTracker>,
    notifier: Arc<dyn NotifierSink>,
}

impl ServiceMonitor {
    pub fn new(resolver: StickyResolver, notifier: Arc<dyn NotifierSink>) -> Self {
        let id = resolver.service_id().to_string();
        Self {
            checks: Mutex::new(()),
            tracker: Mutex::new(TransitionTracker::new(id.clone())),
            players: Mutex::new(PlayerTracker::new(id)),
            resolver,
            notifier,
        }
    }

    pub fn service_id(&self) -> &str {
        self.resolver.service_id()
    }

    pub fn resolver(&self) -> &StickyResolver {
        &self.resolver
    }

    pub async fn health(&self) -> ServiceHealthState {
        self.tracker.lock().await.health().clone()
    }

    pub async fn is_stopped(&self) -> bool {
        self.tracker.lock().await.is_closed()
    }

    /// Probe primary-first, update the tracker, and publish any transition.
    ///
    /// Returns `None` once the monitor has been stopped.
    pub async fn check_health(&self) -> Option<HealthCheck> {
        let _check = self.checks.lock().await;
        if self.is_stopped().await {
            return None;
        }

        let outcome = self.resolver.resolve_for_health_check().await;

        // The tracker lock is held through the sink handoff so nothing is
        // published after stop() returns.
        let mut tracker = self.tracker.lock().await;
        if tracker.is_closed() {
            return None;
        }
        let transition = tracker.observe(Utc::now(), Observation::from(&outcome));
        if let Some(event) = &transition {
            self.notifier
                .notify(Notification::Transition(event.clone()))
                .await;
        }

        Some(HealthCheck {
            state: tracker.state(),
            outcome,
            transition,
        })
    }

    /// Diff the current player list and publish newcomers.
    ///
    /// Skipped while the service is known to be offline. On the very first
    /// call a failed probe seeds an empty baseline.
    pub async fn check_players(&self) -> Option<PlayerJoinEvent> {
        let mut players = self.players.lock().await;
        if self.tracker.lock().await.state() == HealthState::Offline {
            debug!(service = %self.service_id(), "service offline, skipping player check");
            players.seed_empty();
            return None;
        }

        let outcome = self.resolver.resolve_for_data_call().await;

        let Some(status) = outcome.result.info().and_then(|info| info.game()) else {
            if let Some(e) = outcome.result.error() {
                debug!(service = %self.service_id(), error = %e, "player check failed");
            }
            players.seed_empty();
            return None;
        };

        let event = players.diff(Utc::now(), status)?;
        let tracker = self.tracker.lock().await;
        if tracker.is_closed() {
            return None;
        }
        info!(
            service = %self.service_id(),
            joined = event.joined.len(),
            online = event.online_now,
            "players joined"
        );
        self.notifier
            .notify(Notification::PlayersJoined(event.clone()))
            .await;
        Some(event)
    }

    /// Deliver a notification on behalf of this service unless it has been
    /// stopped. Returns whether it was delivered.
    pub async fn publish(&self, notification: Notification) -> bool {
        let tracker = self.tracker.lock().await;
        if tracker.is_closed() {
            debug!(service = %self.service_id(), "monitor stopped, dropping notification");
            return false;
        }
        self.notifier.notify(notification).await;
        true
    }

    /// Close the tracker; no notification is published afterwards.
    pub async fn stop(&self) {
        self.tracker.lock().await.close();
    }
}

/// All monitors, keyed by service id. Immutable after construction.
pub struct MonitorRegistry {
    monitors: HashMap<ServiceId, Arc<ServiceMonitor>>,
}

impl MonitorRegistry {
    pub fn new(monitors: Vec<ServiceMonitor>) -> ConfigResult<Self> {
        let mut map = HashMap::with_capacity(monitors.len());
        for monitor in monitors {
            let id = monitor.service_id().to_string();
            if map.insert(id.clone(), Arc::new(monitor)).is_some() {
                return Err(ConfigError::DuplicateService(id));
            }
        }
        Ok(Self { monitors: map })
    }

    pub fn get(&self, service_id: &str) -> Option<Arc<ServiceMonitor>> {
        self.monitors.get(service_id).cloned()
    }

    pub fn service_ids(&self) -> Vec<ServiceId> {
        let mut ids: Vec<_> = self.monitors.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Run one health check for every service concurrently.
    pub async fn check_all(&self) -> Vec<(ServiceId, Option<HealthCheck>)> {
        let mut tasks = JoinSet::new();
        for (id, monitor) in &self.monitors {
            let id = id.clone();
            let monitor = Arc::clone(monitor);
            tasks.spawn(async move { (id, monitor.check_health().await) });
        }

        let mut results = Vec::with_capacity(self.monitors.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "health check task failed"),
            }
        }
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Stop every monitor.
    pub async fn stop_all(&self) {
        for (id, monitor) in &self.monitors {
            monitor.stop().await;
            debug!(service = %id, "monitor stopped");
        }
        info!("all monitors stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use monolith_core::{
        EndpointSet, GameServerStatus, ProbeError, ProbeResult, Prober, ServerInfo,
        TransitionKind,
    };
    use tokio::sync::mpsc;

    use crate::failover::tests::{Script, ScriptedProber, endpoints};

    struct ChannelSink(mpsc::UnboundedSender<Notification>);

    #[async_trait]
    impl NotifierSink for ChannelSink {
        async fn notify(&self, notification: Notification) {
            let _ = self.0.send(notification);
        }
    }

    fn monitor(
        prober: Arc<dyn Prober>,
        endpoints: EndpointSet,
    ) -> (ServiceMonitor, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let resolver = StickyResolver::new(endpoints, prober, Duration::from_millis(50));
        (ServiceMonitor::new(resolver, Arc::new(ChannelSink(tx))), rx)
    }

    #[tokio::test]
    async fn baseline_on_backup_then_outage() {
        // A hangs past the timeout, B answers.
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Hang), ("B", Script::Up)]));
        let (monitor, mut rx) = monitor(prober.clone(), endpoints(&["A", "B"]));

        let check = monitor.check_health().await.unwrap();
        assert_eq!(check.state, HealthState::Online);
        assert_eq!(check.outcome.address(), "B");
        assert!(check.transition.is_none());
        assert!(rx.try_recv().is_err());
        let online_since = monitor.health().await.since.unwrap();

        prober.set("A", Script::Down);
        prober.set("B", Script::Down);
        let check = monitor.check_health().await.unwrap();
        let event = check.transition.unwrap();
        assert_eq!(event.kind, TransitionKind::WentOffline);
        assert_eq!(event.since, online_since);
        assert_eq!(event.addresses_tried, vec!["A", "B"]);

        match rx.try_recv().unwrap() {
            Notification::Transition(sent) => assert_eq!(sent, event),
            other => panic!("unexpected notification: {other:?}"),
        }

        // Still down: no second alert.
        assert!(monitor.check_health().await.unwrap().transition.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stopped_monitor_publishes_nothing() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Up)]));
        let (monitor, mut rx) = monitor(prober.clone(), endpoints(&["A"]));
        monitor.check_health().await;

        monitor.stop().await;
        prober.set("A", Script::Down);
        assert!(monitor.check_health().await.is_none());
        let batch = monolith_core::SuggestionBatch {
            service_id: "svc".into(),
            address: "A".into(),
            picks: Vec::new(),
        };
        assert!(!monitor.publish(Notification::Suggestions(batch)).await);
        assert!(rx.try_recv().is_err());
        assert_eq!(monitor.health().await.state, HealthState::Online);
    }

    /// Game server prober returning a mutable player list.
    struct GameProber {
        players: std::sync::Mutex<Option<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Prober for GameProber {
        async fn probe(&self, address: &str, _timeout: Duration) -> ProbeResult {
            match self.players.lock().unwrap().clone() {
                Some(names) => ProbeResult::success(
                    address,
                    Duration::from_millis(1),
                    ServerInfo::Game(GameServerStatus {
                        player_count: names.len() as u32,
                        max_players: 10,
                        player_names: names.iter().map(|n| n.to_string()).collect(),
                        ..Default::default()
                    }),
                ),
                None => ProbeResult::failure(
                    address,
                    Duration::ZERO,
                    ProbeError::unreachable(address, "refused"),
                ),
            }
        }
    }

    #[tokio::test]
    async fn player_joins_are_published_after_baseline() {
        let prober = Arc::new(GameProber {
            players: std::sync::Mutex::new(Some(vec!["Steve"])),
        });
        let (monitor, mut rx) = monitor(
            prober.clone(),
            EndpointSet::new("survival", vec!["mc:25565".to_string()]).unwrap(),
        );
        monitor.check_health().await;

        assert!(monitor.check_players().await.is_none());
        *prober.players.lock().unwrap() = Some(vec!["Steve", "Alex"]);
        let event = monitor.check_players().await.unwrap();
        assert_eq!(event.joined.iter().collect::<Vec<_>>(), vec!["Alex"]);
        assert!(matches!(rx.try_recv().unwrap(), Notification::PlayersJoined(_)));
    }

    #[tokio::test]
    async fn player_check_skipped_while_offline() {
        let prober = Arc::new(GameProber {
            players: std::sync::Mutex::new(None),
        });
        let (monitor, _rx) = monitor(
            prober.clone(),
            EndpointSet::new("survival", vec!["mc".to_string()]).unwrap(),
        );
        monitor.check_health().await;
        assert_eq!(monitor.health().await.state, HealthState::Offline);

        *prober.players.lock().unwrap() = Some(vec!["Steve"]);
        assert!(monitor.check_players().await.is_none());

        // Once back online, everyone present counts as a join.
        monitor.check_health().await;
        let event = monitor.check_players().await.unwrap();
        assert!(event.joined.contains("Steve"));
    }

    #[tokio::test]
    async fn registry_rejects_duplicates_and_checks_all() {
        let prober: Arc<dyn Prober> =
            Arc::new(ScriptedProber::new(&[("A", Script::Up), ("B", Script::Down)]));
        let (a, _) = monitor(prober.clone(), EndpointSet::new("a", vec!["A".into()]).unwrap());
        let (a2, _) = monitor(prober.clone(), EndpointSet::new("a", vec!["B".into()]).unwrap());
        assert!(matches!(
            MonitorRegistry::new(vec![a, a2]),
            Err(ConfigError::DuplicateService(_))
        ));

        let (a, _) = monitor(prober.clone(), EndpointSet::new("a", vec!["A".into()]).unwrap());
        let (b, _) = monitor(prober.clone(), EndpointSet::new("b", vec!["B".into()]).unwrap());
        let registry = MonitorRegistry::new(vec![a, b]).unwrap();
        assert_eq!(registry.service_ids(), vec!["a", "b"]);

        let results = registry.check_all().await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.as_ref().unwrap().state, HealthState::Online);
        assert_eq!(results[1].1.as_ref().unwrap().state, HealthState::Offline);

        registry.stop_all().await;
        assert!(registry.get("a").unwrap().is_stopped().await);
    }

    /// Answers from a queue of up/down results, slowly enough that callers
    /// overlap.
    struct QueuedProber {
        queue: std::sync::Mutex<std::collections::VecDeque<bool>>,
    }

    impl QueuedProber {
        fn new(results: &[bool]) -> Self {
            Self {
                queue: std::sync::Mutex::new(results.iter().copied().collect()),
            }
        }
    }

    #[async_trait]
    impl Prober for QueuedProber {
        async fn probe(&self, address: &str, _timeout: Duration) -> ProbeResult {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let up = self.queue.lock().unwrap().pop_front().unwrap_or(false);
            if up {
                ProbeResult::success(
                    address,
                    Duration::from_millis(5),
                    ServerInfo::Game(GameServerStatus::default()),
                )
            } else {
                ProbeResult::failure(address, Duration::ZERO, ProbeError::unreachable(address, "refused"))
            }
        }
    }

    fn shared_monitor(
        prober: Arc<dyn Prober>,
    ) -> (Arc<ServiceMonitor>, mpsc::UnboundedReceiver<Notification>) {
        let (monitor, rx) = monitor(prober, endpoints(&["A"]));
        (Arc::new(monitor), rx)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checks_alert_once_and_count_every_failure() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Up)]));
        let (monitor, mut rx) = shared_monitor(prober.clone());
        monitor.check_health().await;

        prober.set("A", Script::Down);
        let mut tasks = JoinSet::new();
        for _ in 0..8 {
            let monitor = Arc::clone(&monitor);
            tasks.spawn(async move { monitor.check_health().await });
        }
        let mut transitions = 0;
        while let Some(check) = tasks.join_next().await {
            if check.unwrap().unwrap().transition.is_some() {
                transitions += 1;
            }
        }

        assert_eq!(transitions, 1);
        let health = monitor.health().await;
        assert_eq!(health.state, HealthState::Offline);
        assert_eq!(health.consecutive_failures, 8);
        assert!(matches!(rx.try_recv().unwrap(), Notification::Transition(_)));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_checks_observe_results_in_probe_order() {
        // Baseline up, then down, up, down, up.
        let prober = Arc::new(QueuedProber::new(&[true, false, true, false, true]));
        let (monitor, mut rx) = shared_monitor(prober);
        monitor.check_health().await;

        let mut tasks = JoinSet::new();
        for _ in 0..4 {
            let monitor = Arc::clone(&monitor);
            tasks.spawn(async move { monitor.check_health().await });
        }
        while let Some(check) = tasks.join_next().await {
            assert!(check.unwrap().is_some());
        }

        let mut kinds = Vec::new();
        while let Ok(Notification::Transition(event)) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(
            kinds,
            vec![
                TransitionKind::WentOffline,
                TransitionKind::WentOnline,
                TransitionKind::WentOffline,
                TransitionKind::WentOnline,
            ]
        );
        let health = monitor.health().await;
        assert_eq!(health.state, HealthState::Online);
        assert_eq!(health.consecutive_failures, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_during_check_suppresses_its_transition() {
        let prober = Arc::new(ScriptedProber::new(&[("A", Script::Up)]));
        let (monitor, mut rx) = shared_monitor(prober.clone());
        monitor.check_health().await;

        // The probe runs into the 50ms timeout while stop() lands.
        prober.set("A", Script::Hang);
        let check = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move { monitor.check_health().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        monitor.stop().await;

        assert!(check.await.unwrap().is_none());
        assert!(rx.try_recv().is_err());
        let health = monitor.health().await;
        assert_eq!(health.state, HealthState::Online);
        assert_eq!(health.consecutive_failures, 0);
    }
}
