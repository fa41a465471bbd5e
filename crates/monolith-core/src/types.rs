//! Shared domain types used across Monolith crates.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ProbeError};

/// Stable identifier for a monitored service.
pub type ServiceId = String;

// ── Probing ───────────────────────────────────────────────────────

/// What a reachable endpoint reported about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerInfo {
    Media(MediaServerInfo),
    Game(GameServerStatus),
}

/// Media server identity from its system info endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaServerInfo {
    pub server_name: String,
    pub version: String,
    pub operating_system: Option<String>,
}

/// Game server status from a status ping.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameServerStatus {
    pub version: String,
    /// Message of the day with formatting codes stripped.
    pub motd: String,
    pub player_count: u32,
    pub max_players: u32,
    /// Names of connected players; empty when the server hides its list.
    pub player_names: BTreeSet<String>,
    /// True when players are online but the server does not list them.
    pub players_hidden: bool,
}

impl ServerInfo {
    pub fn version(&self) -> &str {
        match self {
            Self::Media(info) => &info.version,
            Self::Game(status) => &status.version,
        }
    }

    /// Player status, for services that have players.
    pub fn game(&self) -> Option<&GameServerStatus> {
        match self {
            Self::Game(status) => Some(status),
            Self::Media(_) => None,
        }
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        match self {
            Self::Media(info) => format!("{} v{}", info.server_name, info.version),
            Self::Game(status) => format!(
                "{}/{} players, v{}",
                status.player_count, status.max_players, status.version
            ),
        }
    }
}

/// Outcome of probing a single address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub address: String,
    pub latency: Duration,
    pub outcome: Result<ServerInfo, ProbeError>,
}

impl ProbeResult {
    pub fn success(address: impl Into<String>, latency: Duration, info: ServerInfo) -> Self {
        Self {
            address: address.into(),
            latency,
            outcome: Ok(info),
        }
    }

    pub fn failure(address: impl Into<String>, latency: Duration, error: ProbeError) -> Self {
        Self {
            address: address.into(),
            latency,
            outcome: Err(error),
        }
    }

    pub fn reachable(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn info(&self) -> Option<&ServerInfo> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ProbeError> {
        self.outcome.as_ref().err()
    }
}

// ── Content ───────────────────────────────────────────────────────

/// Library content categories a media server can be queried for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContentKind {
    Movie,
    Series,
    Episode,
    Audio,
    MusicAlbum,
}

impl ContentKind {
    /// Item type name used in remote queries.
    pub fn api_name(self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::Series => "Series",
            Self::Episode => "Episode",
            Self::Audio => "Audio",
            Self::MusicAlbum => "MusicAlbum",
        }
    }

    /// Plural, human-facing label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Movie => "Movies",
            Self::Series => "TV Shows",
            Self::Episode => "Episodes",
            Self::Audio => "Music",
            Self::MusicAlbum => "Albums",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

impl FromStr for ContentKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(Self::Movie),
            "series" | "show" | "shows" => Ok(Self::Series),
            "episode" | "episodes" => Ok(Self::Episode),
            "audio" | "music" | "song" => Ok(Self::Audio),
            "musicalbum" | "album" => Ok(Self::MusicAlbum),
            _ => Err(ConfigError::UnknownContentKind(s.to_string())),
        }
    }
}

/// A library item as returned by a remote lister.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Stable identity used for deduplication.
    pub id: String,
    pub name: String,
    /// Raw item type reported by the server ("Movie", "Episode", ...).
    pub item_type: String,
    /// When the item was added to the library.
    pub created_at: Option<DateTime<Utc>>,
    pub overview: Option<String>,
    pub year: Option<i32>,
    pub series_name: Option<String>,
    pub album: Option<String>,
    pub artists: Vec<String>,
}

impl Item {
    pub fn new(id: impl Into<String>, name: impl Into<String>, item_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            item_type: item_type.into(),
            created_at: None,
            overview: None,
            year: None,
            series_name: None,
            album: None,
            artists: Vec::new(),
        }
    }

    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Title formatted for the item's type.
    ///
    /// Episodes read "Series - Episode", tracks "Artist, Artist - Title",
    /// anything with a year "Title (Year)".
    pub fn display_title(&self) -> String {
        if self.item_type == "Episode"
            && let Some(series) = &self.series_name
        {
            return format!("{series} - {}", self.name);
        }
        if self.item_type == "Audio" && !self.artists.is_empty() {
            return format!("{} - {}", self.artists.join(", "), self.name);
        }
        if let Some(year) = self.year {
            return format!("{} ({year})", self.name);
        }
        self.name.clone()
    }
}
