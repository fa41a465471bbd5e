//! monolith-core — shared vocabulary for the Monolith service monitor.
//!
//! Everything the health engine, change feed, scheduler, and protocol
//! adapters agree on lives here:
//!
//! - [`EndpointSet`]: priority-ordered candidate addresses for one service
//! - [`ProbeResult`] / [`ServerInfo`]: what a single probe observed
//! - [`Item`] / [`ContentKind`]: library items returned by a remote lister
//! - [`capability`]: the `Prober`, `RemoteLister`, and `NotifierSink` seams
//! - [`event`]: transition, content, and player notifications
//! - [`config`]: TOML + environment configuration, validated into [`Settings`]

pub mod capability;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod event;
pub mod parse;
pub mod types;

pub use capability::{NotifierSink, Prober, RemoteLister};
pub use config::{JELLYFIN_SERVICE_ID, JellyfinSettings, MinecraftSettings, MonitorConfig, Settings};
pub use endpoint::EndpointSet;
pub use error::{ConfigError, ConfigResult, ProbeError};
pub use event::*;
pub use parse::{parse_duration, parse_time_of_day};
pub use types::*;
