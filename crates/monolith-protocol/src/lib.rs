//! monolith-protocol — wire adapters for monitored services.
//!
//! Implements the `Prober` and `RemoteLister` capabilities from
//! monolith-core against real servers:
//!
//! ```text
//! JellyfinClient   (HTTP/1.1 + JSON, rustls for https)
//!   ├── Prober        GET /System/Info
//!   └── RemoteLister  GET /Items
//! MinecraftProber  (Server List Ping over TCP)
//!   └── Prober        handshake → status → ping
//! ```
//!
//! Adapters never panic on remote input. Every failure becomes a
//! `ProbeError` naming the endpoint address that was tried.

pub mod http;
pub mod jellyfin;
pub mod minecraft;

pub use http::{ClientSetupError, HttpClient};
pub use jellyfin::JellyfinClient;
pub use minecraft::MinecraftProber;
