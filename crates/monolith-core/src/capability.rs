//! Capabilities supplied by the protocol layer and the delivery layer.
//!
//! The health engine, change feed, and scheduler only ever see these
//! traits, so they never branch on which kind of service they are
//! talking to.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProbeError;
use crate::event::Notification;
use crate::types::{ContentKind, Item, ProbeResult};

/// Protocol-specific reachability check for one address.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `address`, giving up after roughly `timeout`.
    ///
    /// Failures are reported inside the returned `ProbeResult`, never as
    /// a panic or a separate error channel.
    async fn probe(&self, address: &str, timeout: Duration) -> ProbeResult;
}

/// Lists library items of one kind from a content-bearing service.
#[async_trait]
pub trait RemoteLister: Send + Sync {
    async fn list_items(&self, address: &str, kind: ContentKind) -> Result<Vec<Item>, ProbeError>;

    /// Like `list_items`, letting the remote leave out items created before
    /// `created_since`. The hint may be ignored; callers filter again.
    async fn list_items_since(
        &self,
        address: &str,
        kind: ContentKind,
        created_since: DateTime<Utc>,
    ) -> Result<Vec<Item>, ProbeError> {
        let _ = created_since;
        self.list_items(address, kind).await
    }
}

/// Fire-and-forget delivery of notifications.
///
/// Implementations own their own retries; callers never wait on or react
/// to delivery success. `notify` must hand off and return promptly: monitors
/// call it while holding their stop gate.
#[async_trait]
pub trait NotifierSink: Send + Sync {
    async fn notify(&self, notification: Notification);
}
