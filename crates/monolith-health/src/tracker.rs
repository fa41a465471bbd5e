//! Online/offline state machine for one service.
//!
//! The first observation only records a baseline. After that, every flip
//! between online and offline yields exactly one [`TransitionEvent`], and
//! repeated observations of the same state yield none.

use chrono::{DateTime, Utc};
use monolith_core::{ServerInfo, ServiceId, TransitionEvent, TransitionKind};
use tracing::{debug, info, warn};

use crate::failover::FailoverOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown,
    Online,
    Offline,
}

/// Snapshot of a tracker's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHealthState {
    pub state: HealthState,
    /// When the current state began.
    pub since: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_online: Option<DateTime<Utc>>,
}

impl Default for ServiceHealthState {
    fn default() -> Self {
        Self {
            state: HealthState::Unknown,
            since: None,
            consecutive_failures: 0,
            last_online: None,
        }
    }
}

/// One health observation fed into the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub reachable: bool,
    pub address: Option<String>,
    pub addresses_tried: Vec<String>,
    pub info: Option<ServerInfo>,
    pub error: Option<String>,
}

impl Observation {
    pub fn online(address: impl Into<String>, info: Option<ServerInfo>) -> Self {
        let address = address.into();
        Self {
            reachable: true,
            addresses_tried: vec![address.clone()],
            address: Some(address),
            info,
            error: None,
        }
    }

    pub fn offline(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            address: None,
            addresses_tried: Vec::new(),
            info: None,
            error: Some(error.into()),
        }
    }
}

impl From<&FailoverOutcome> for Observation {
    fn from(outcome: &FailoverOutcome) -> Self {
        Self {
            reachable: outcome.reachable(),
            address: Some(outcome.address().to_string()),
            addresses_tried: outcome.attempted.clone(),
            info: outcome.result.info().cloned(),
            error: outcome.failure_summary(),
        }
    }
}

pub struct TransitionTracker {
    service_id: ServiceId,
    health: ServiceHealthState,
    closed: bool,
}

impl TransitionTracker {
    pub fn new(service_id: impl Into<ServiceId>) -> Self {
        Self {
            service_id: service_id.into(),
            health: ServiceHealthState::default(),
            closed: false,
        }
    }

    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    pub fn state(&self) -> HealthState {
        self.health.state
    }

    pub fn health(&self) -> &ServiceHealthState {
        &self.health
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop accepting observations. Later calls to `observe` return `None`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Record an observation and return the transition it caused, if any.
    pub fn observe(&mut self, now: DateTime<Utc>, obs: Observation) -> Option<TransitionEvent> {
        if self.closed {
            return None;
        }

        let next = if obs.reachable {
            HealthState::Online
        } else {
            HealthState::Offline
        };
        let previous = self.health.state;
        let period_start = self.health.since.unwrap_or(now);

        match next {
            HealthState::Online => {
                self.health.consecutive_failures = 0;
                self.health.last_online = Some(now);
            }
            _ => {
                self.health.consecutive_failures = self.health.consecutive_failures.saturating_add(1);
            }
        }

        if previous == next {
            if next == HealthState::Offline {
                debug!(
                    service = %self.service_id,
                    failures = self.health.consecutive_failures,
                    "still offline"
                );
            }
            return None;
        }

        self.health.state = next;
        self.health.since = Some(now);

        if previous == HealthState::Unknown {
            info!(service = %self.service_id, state = ?next, "initial health state");
            return None;
        }

        let kind = if next == HealthState::Online {
            info!(service = %self.service_id, address = ?obs.address, "service back online");
            TransitionKind::WentOnline
        } else {
            warn!(service = %self.service_id, error = ?obs.error, "service went offline");
            TransitionKind::WentOffline
        };

        Some(TransitionEvent {
            service_id: self.service_id.clone(),
            kind,
            since: period_start,
            at: now,
            address: obs.address,
            addresses_tried: obs.addresses_tried,
            info: obs.info,
            error: obs.error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn t(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    #[test]
    fn first_observation_is_baseline() {
        let mut tracker = TransitionTracker::new("jellyfin");
        assert_eq!(tracker.state(), HealthState::Unknown);

        assert!(tracker.observe(t(0), Observation::offline("down")).is_none());
        assert_eq!(tracker.state(), HealthState::Offline);
        assert_eq!(tracker.health().since, Some(t(0)));

        let mut tracker = TransitionTracker::new("jellyfin");
        assert!(tracker.observe(t(0), Observation::online("A", None)).is_none());
        assert_eq!(tracker.state(), HealthState::Online);
    }

    #[test]
    fn one_event_per_flip() {
        let mut tracker = TransitionTracker::new("svc");
        tracker.observe(t(0), Observation::online("A", None));
        assert!(tracker.observe(t(5), Observation::online("A", None)).is_none());

        let event = tracker.observe(t(10), Observation::offline("refused")).unwrap();
        assert_eq!(event.kind, TransitionKind::WentOffline);
        assert_eq!(event.since, t(0));
        assert_eq!(event.error.as_deref(), Some("refused"));

        assert!(tracker.observe(t(15), Observation::offline("refused")).is_none());
        assert!(tracker.observe(t(20), Observation::offline("refused")).is_none());
        assert_eq!(tracker.health().consecutive_failures, 3);
    }

    #[test]
    fn downtime_measured_from_offline_transition() {
        let mut tracker = TransitionTracker::new("svc");
        tracker.observe(t(0), Observation::online("A", None));
        tracker.observe(t(10), Observation::offline("x"));
        tracker.observe(t(15), Observation::offline("x"));

        let event = tracker.observe(t(40), Observation::online("B", None)).unwrap();
        assert_eq!(event.kind, TransitionKind::WentOnline);
        assert_eq!(event.since, t(10));
        assert_eq!(event.duration(), TimeDelta::minutes(30));
        assert_eq!(event.address.as_deref(), Some("B"));
        assert_eq!(tracker.health().consecutive_failures, 0);
        assert_eq!(tracker.health().last_online, Some(t(40)));
    }

    #[test]
    fn closed_tracker_ignores_observations() {
        let mut tracker = TransitionTracker::new("svc");
        tracker.observe(t(0), Observation::online("A", None));
        tracker.close();

        assert!(tracker.observe(t(1), Observation::offline("x")).is_none());
        assert_eq!(tracker.state(), HealthState::Online);
    }
}
