//! monolith-scheduler — periodic job orchestration.
//!
//! Runs named jobs on interval or time-of-day triggers. The orchestrator:
//!
//! - Drives each job from its own task
//! - Never overlaps two runs of the same job (extra firings are coalesced)
//! - Isolates failures: an erroring or panicking job keeps its schedule and
//!   leaves other jobs alone
//! - Drains in-flight runs on shutdown, aborting those past a grace period
//!
//! # Architecture
//!
//! ```text
//! JobOrchestrator
//!   └── Per-job slot
//!       ├── Trigger (Interval | DailyTimes in a timezone)
//!       ├── Driver task (sleep → launch → skip missed instants)
//!       └── Run task (body + drop guard releasing the running flag)
//! ```

pub mod error;
pub mod orchestrator;
pub mod trigger;

pub use error::{SchedulerError, SchedulerResult};
pub use orchestrator::{JobFn, JobOrchestrator, JobStats, RunOutcome};
pub use trigger::Trigger;
