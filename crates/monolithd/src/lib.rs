//! monolithd — the Monolith daemon.
//!
//! Assembles the workspace crates into one process:
//!
//! ```text
//! Settings (TOML + env)
//!   └── App
//!       ├── MonitorRegistry (one ServiceMonitor per server)
//!       ├── ContentJobs (change feed + suggestions for the media server)
//!       ├── JobOrchestrator
//!       │   ├── jellyfin:health / :announce / :suggest
//!       │   └── minecraft:<name>:health / :players
//!       └── NotifierSink (LogNotifier by default)
//! ```

pub mod app;
pub mod jobs;
pub mod notifier;

pub use app::{App, Capabilities, OnceTarget};
pub use notifier::{ChannelNotifier, LogNotifier, format_duration};
