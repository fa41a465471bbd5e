//! Player join detection for game servers.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use monolith_core::{GameServerStatus, PlayerJoinEvent, ServiceId};
use tracing::debug;

/// Remembers who was online last time and reports newcomers.
///
/// Only joins are reported. Players who leave simply drop out of the
/// remembered set.
pub struct PlayerTracker {
    service_id: ServiceId,
    known: Option<BTreeSet<String>>,
}

impl PlayerTracker {
    pub fn new(service_id: impl Into<ServiceId>) -> Self {
        Self {
            service_id: service_id.into(),
            known: None,
        }
    }

    pub fn known(&self) -> Option<&BTreeSet<String>> {
        self.known.as_ref()
    }

    /// Set an empty baseline if none exists yet.
    ///
    /// Used when the server was unreachable at startup, so that anyone seen
    /// once it comes up counts as a join.
    pub fn seed_empty(&mut self) {
        if self.known.is_none() {
            self.known = Some(BTreeSet::new());
        }
    }

    /// Compare a fresh snapshot against the previous one.
    ///
    /// The first snapshot becomes the baseline and reports nothing. Hidden
    /// player lists are skipped without touching the remembered set.
    pub fn diff(&mut self, at: DateTime<Utc>, status: &GameServerStatus) -> Option<PlayerJoinEvent> {
        if status.players_hidden {
            debug!(service = %self.service_id, online = status.player_count, "player list hidden, skipping diff");
            return None;
        }

        let current = status.player_names.clone();
        let Some(previous) = self.known.replace(current.clone()) else {
            debug!(service = %self.service_id, players = current.len(), "initial player snapshot");
            return None;
        };

        let joined: BTreeSet<String> = current.difference(&previous).cloned().collect();
        if joined.is_empty() {
            return None;
        }

        Some(PlayerJoinEvent {
            service_id: self.service_id.clone(),
            joined,
            online_now: status.player_count,
            max_players: status.max_players,
            at,
        })
    }
}
