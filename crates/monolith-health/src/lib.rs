//! monolith-health — multi-endpoint health checking for Monolith.
//!
//! Every monitored service has an ordered set of endpoints. Probing walks
//! that set until something answers, a sticky cache remembers the winner,
//! and a small state machine turns raw observations into online/offline
//! transitions without alert storms.
//!
//! # Architecture
//!
//! ```text
//! MonitorRegistry
//!   └── ServiceMonitor (one per service)
//!       ├── StickyResolver
//!       │   └── failover::probe() → FailoverOutcome
//!       ├── TransitionTracker (Unknown / Online / Offline)
//!       ├── PlayerTracker (join diffs for game servers)
//!       └── NotifierSink for transitions and joins
//! ```
//!
//! # Stop gate
//!
//! `MonitorRegistry::stop_all()` closes every tracker. Checks that finish
//! after that point publish nothing.

pub mod failover;
pub mod monitor;
pub mod players;
pub mod resolver;
pub mod tracker;

pub use failover::FailoverOutcome;
pub use monitor::{HealthCheck, MonitorRegistry, ServiceMonitor};
pub use players::PlayerTracker;
pub use resolver::{ResolvedEndpoint, StickyResolver};
pub use tracker::{HealthState, Observation, ServiceHealthState, TransitionTracker};
