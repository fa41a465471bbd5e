//! Notifications handed to the notifier sink.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::{ContentKind, Item, ServerInfo, ServiceId};

/// Direction of an availability flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    WentOnline,
    WentOffline,
}

/// A genuine online/offline flip for one service.
///
/// `since` is the start of the period that just ended: for `WentOffline`
/// the moment the service came online, for `WentOnline` the moment it
/// went offline. `at - since` is therefore the uptime or downtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub service_id: ServiceId,
    pub kind: TransitionKind,
    pub since: DateTime<Utc>,
    pub at: DateTime<Utc>,
    /// Address that answered (online) or was last tried (offline).
    pub address: Option<String>,
    /// Every address attempted during the observing probe.
    pub addresses_tried: Vec<String>,
    pub info: Option<ServerInfo>,
    /// Failure summary for offline transitions.
    pub error: Option<String>,
}

impl TransitionEvent {
    /// Length of the period that just ended.
    pub fn duration(&self) -> TimeDelta {
        self.at - self.since
    }
}

/// Recently added items for one content kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSection {
    pub kind: ContentKind,
    pub items: Vec<Item>,
}

/// Everything new on a content service within the lookback window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBatch {
    pub service_id: ServiceId,
    pub window: Duration,
    /// Address the items were listed from, for building links.
    pub address: String,
    pub sections: Vec<ContentSection>,
}

impl ContentBatch {
    pub fn total_items(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }
}

/// Random library picks, one per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionBatch {
    pub service_id: ServiceId,
    pub address: String,
    pub picks: Vec<(ContentKind, Item)>,
}

/// Players seen for the first time since the previous snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerJoinEvent {
    pub service_id: ServiceId,
    pub joined: BTreeSet<String>,
    pub online_now: u32,
    pub max_players: u32,
    pub at: DateTime<Utc>,
}

/// Anything the core hands to the notifier sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Transition(TransitionEvent),
    NewContent(ContentBatch),
    Suggestions(SuggestionBatch),
    PlayersJoined(PlayerJoinEvent),
}

impl Notification {
    pub fn service_id(&self) -> &str {
        match self {
            Self::Transition(e) => &e.service_id,
            Self::NewContent(b) => &b.service_id,
            Self::Suggestions(b) => &b.service_id,
            Self::PlayersJoined(e) => &e.service_id,
        }
    }
}
