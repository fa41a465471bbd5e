//! monolith.toml configuration.
//!
//! [`MonitorConfig`] is the raw, serde-shaped file. Environment overrides are
//! layered on with [`MonitorConfig::apply_env`], and [`MonitorConfig::validate`]
//! turns the result into typed [`Settings`] the rest of the workspace reads.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointSet;
use crate::error::{ConfigError, ConfigResult};
use crate::parse::{duration_field, parse_time_of_day, split_list};
use crate::types::ContentKind;

/// Service id of the media server.
pub const JELLYFIN_SERVICE_ID: &str = "jellyfin";

const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub schedule: ScheduleConfig,
    pub jellyfin: JellyfinConfig,
    pub minecraft: MinecraftConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JellyfinConfig {
    pub enabled: bool,
    /// Base URLs in priority order.
    pub urls: Vec<String>,
    pub api_key: Option<String>,
    /// Kinds announced as new content.
    pub content_types: Vec<String>,
    /// Kinds picked from for random suggestions.
    pub suggestion_types: Vec<String>,
    pub timeout: String,
    /// Optional server-side cap on items per listing request.
    pub page_limit: Option<u32>,
    pub schedule: JellyfinScheduleConfig,
}

impl Default for JellyfinConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            urls: Vec::new(),
            api_key: None,
            content_types: vec!["Movie".into(), "Series".into(), "Audio".into()],
            suggestion_types: vec!["Movie".into(), "Series".into(), "MusicAlbum".into()],
            timeout: "10s".to_string(),
            page_limit: None,
            schedule: JellyfinScheduleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JellyfinScheduleConfig {
    pub announcement_times: Vec<String>,
    pub suggestion_times: Vec<String>,
    pub health_check_interval: String,
    pub lookback: String,
    pub max_items_per_type: usize,
}

impl Default for JellyfinScheduleConfig {
    fn default() -> Self {
        Self {
            announcement_times: vec!["17:00".to_string()],
            suggestion_times: vec!["12:00".to_string()],
            health_check_interval: "5m".to_string(),
            lookback: "24h".to_string(),
            max_items_per_type: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinecraftConfig {
    pub enabled: bool,
    pub timeout: String,
    pub schedule: MinecraftScheduleConfig,
    pub servers: Vec<MinecraftServerConfig>,
}

impl Default for MinecraftConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            timeout: "5s".to_string(),
            schedule: MinecraftScheduleConfig::default(),
            servers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MinecraftScheduleConfig {
    pub health_check_interval: String,
    pub player_check_interval: String,
}

impl Default for MinecraftScheduleConfig {
    fn default() -> Self {
        Self {
            health_check_interval: "1m".to_string(),
            player_check_interval: "30s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinecraftServerConfig {
    pub name: String,
    /// `host[:port]` addresses in priority order.
    pub urls: Vec<String>,
}

// ── Validated settings ────────────────────────────────────────────

/// Validated, typed configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub timezone: Tz,
    pub jellyfin: Option<JellyfinSettings>,
    pub minecraft: Option<MinecraftSettings>,
}

#[derive(Debug, Clone)]
pub struct JellyfinSettings {
    pub endpoints: EndpointSet,
    pub api_key: String,
    pub content_types: Vec<ContentKind>,
    pub suggestion_types: Vec<ContentKind>,
    pub timeout: Duration,
    pub page_limit: Option<u32>,
    pub announcement_times: Vec<NaiveTime>,
    pub suggestion_times: Vec<NaiveTime>,
    pub health_check_interval: Duration,
    pub lookback: Duration,
    pub max_items_per_type: usize,
}

#[derive(Debug, Clone)]
pub struct MinecraftSettings {
    /// One endpoint set per server; the service id is the server name.
    pub servers: Vec<EndpointSet>,
    pub timeout: Duration,
    pub health_check_interval: Duration,
    pub player_check_interval: Duration,
}

impl Settings {
    /// Ids of every enabled service, media server first.
    pub fn service_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        if let Some(jf) = &self.jellyfin {
            ids.push(jf.endpoints.service_id().to_string());
        }
        if let Some(mc) = &self.minecraft {
            ids.extend(mc.servers.iter().map(|s| s.service_id().to_string()));
        }
        ids
    }
}

impl MonitorConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a starter config with one media server and one game server.
    pub fn scaffold(jellyfin_url: &str, minecraft_address: &str) -> Self {
        let mut config = Self::default();
        config.jellyfin.urls = vec![jellyfin_url.to_string()];
        config.jellyfin.api_key = Some("changeme".to_string());
        config.minecraft.enabled = true;
        config.minecraft.servers = vec![MinecraftServerConfig {
            name: "survival".to_string(),
            urls: vec![minecraft_address.to_string()],
        }];
        config
    }

    /// Layer environment overrides on top of the file values.
    ///
    /// Takes the variables as an iterator so callers can pass
    /// `std::env::vars()` or a fixed list.
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> ConfigResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(v) = get("SCHEDULE_TIMEZONE") {
            self.schedule.timezone = v.to_string();
        }

        let jf = &mut self.jellyfin;
        if let Some(v) = get("JELLYFIN_ENABLED") {
            jf.enabled = parse_bool("JELLYFIN_ENABLED", v)?;
        }
        if let Some(v) = get("JELLYFIN_URLS") {
            jf.urls = split_list(v);
        } else if let Some(v) = get("JELLYFIN_URL") {
            jf.urls = vec![v.to_string()];
        }
        if let Some(v) = get("JELLYFIN_API_KEY") {
            jf.api_key = Some(v.to_string());
        }
        if let Some(v) = get("CONTENT_TYPES") {
            jf.content_types = split_list(v);
        }
        if let Some(v) = get("JELLYFIN_ANNOUNCEMENT_TIMES").or_else(|| get("SCHEDULE_ANNOUNCEMENT_TIMES")) {
            jf.schedule.announcement_times = split_list(v);
        }
        if let Some(v) = get("JELLYFIN_SUGGESTION_TIMES") {
            jf.schedule.suggestion_times = split_list(v);
        }
        // The SCHEDULE_* forms take bare numbers: minutes and hours.
        if let Some(v) = get("JELLYFIN_HEALTH_CHECK_INTERVAL") {
            jf.schedule.health_check_interval = v.to_string();
        } else if let Some(v) = get("SCHEDULE_HEALTH_CHECK_INTERVAL") {
            let minutes = parse_count("SCHEDULE_HEALTH_CHECK_INTERVAL", v)?;
            jf.schedule.health_check_interval = format!("{minutes}m");
        }
        if let Some(v) = get("JELLYFIN_LOOKBACK") {
            jf.schedule.lookback = v.to_string();
        } else if let Some(v) = get("SCHEDULE_LOOKBACK_HOURS") {
            let hours = parse_count("SCHEDULE_LOOKBACK_HOURS", v)?;
            jf.schedule.lookback = format!("{hours}h");
        }
        if let Some(v) = get("JELLYFIN_MAX_ITEMS_PER_TYPE") {
            jf.schedule.max_items_per_type = parse_count("JELLYFIN_MAX_ITEMS_PER_TYPE", v)? as usize;
        }

        let mc = &mut self.minecraft;
        if let Some(v) = get("MINECRAFT_ENABLED") {
            mc.enabled = parse_bool("MINECRAFT_ENABLED", v)?;
        }
        if let Some(v) = get("MINECRAFT_HEALTH_CHECK_INTERVAL") {
            mc.schedule.health_check_interval = v.to_string();
        }
        if let Some(v) = get("MINECRAFT_PLAYER_CHECK_INTERVAL") {
            mc.schedule.player_check_interval = v.to_string();
        }
        Ok(())
    }

    /// Check every value and build typed settings.
    ///
    /// Disabled services are not validated.
    pub fn validate(&self) -> ConfigResult<Settings> {
        let timezone: Tz = self
            .schedule
            .timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.schedule.timezone.clone()))?;

        let jellyfin = if self.jellyfin.enabled {
            Some(self.validate_jellyfin()?)
        } else {
            None
        };
        let minecraft = if self.minecraft.enabled {
            Some(self.validate_minecraft()?)
        } else {
            None
        };

        if jellyfin.is_none() && minecraft.is_none() {
            return Err(ConfigError::Invalid {
                field: "services".to_string(),
                reason: "no service is enabled".to_string(),
            });
        }

        let settings = Settings {
            timezone,
            jellyfin,
            minecraft,
        };
        let mut seen = HashSet::new();
        for id in settings.service_ids() {
            if !seen.insert(id.clone()) {
                return Err(ConfigError::DuplicateService(id));
            }
        }
        Ok(settings)
    }

    fn validate_jellyfin(&self) -> ConfigResult<JellyfinSettings> {
        let jf = &self.jellyfin;
        let endpoints = EndpointSet::new(JELLYFIN_SERVICE_ID, normalize_urls(&jf.urls))?;
        let api_key = jf
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::Missing("jellyfin.api_key".to_string()))?
            .to_string();

        if jf.page_limit == Some(0) {
            return Err(ConfigError::Invalid {
                field: "jellyfin.page_limit".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(JellyfinSettings {
            endpoints,
            api_key,
            content_types: parse_kinds(&jf.content_types)?,
            suggestion_types: parse_kinds(&jf.suggestion_types)?,
            timeout: duration_field("jellyfin.timeout", &jf.timeout)?,
            page_limit: jf.page_limit,
            announcement_times: parse_times(&jf.schedule.announcement_times)?,
            suggestion_times: parse_times(&jf.schedule.suggestion_times)?,
            health_check_interval: duration_field(
                "jellyfin.schedule.health_check_interval",
                &jf.schedule.health_check_interval,
            )?,
            lookback: duration_field("jellyfin.schedule.lookback", &jf.schedule.lookback)?,
            max_items_per_type: jf.schedule.max_items_per_type,
        })
    }

    fn validate_minecraft(&self) -> ConfigResult<MinecraftSettings> {
        let mc = &self.minecraft;
        if mc.servers.is_empty() {
            return Err(ConfigError::Missing("minecraft.servers".to_string()));
        }
        let mut servers = Vec::with_capacity(mc.servers.len());
        for server in &mc.servers {
            let name = server.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Missing("minecraft.servers.name".to_string()));
            }
            let urls = server.urls.iter().map(|u| u.trim().to_string()).collect();
            servers.push(EndpointSet::new(name, urls)?);
        }

        Ok(MinecraftSettings {
            servers,
            timeout: duration_field("minecraft.timeout", &mc.timeout)?,
            health_check_interval: duration_field(
                "minecraft.schedule.health_check_interval",
                &mc.schedule.health_check_interval,
            )?,
            player_check_interval: duration_field(
                "minecraft.schedule.player_check_interval",
                &mc.schedule.player_check_interval,
            )?,
        })
    }
}

fn normalize_urls(urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .collect()
}

fn parse_kinds(names: &[String]) -> ConfigResult<Vec<ContentKind>> {
    let mut kinds: Vec<ContentKind> = Vec::with_capacity(names.len());
    for name in names {
        let kind = name.parse()?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }
    Ok(kinds)
}

fn parse_times(times: &[String]) -> ConfigResult<Vec<NaiveTime>> {
    let mut parsed = times
        .iter()
        .map(|t| parse_time_of_day(t))
        .collect::<ConfigResult<Vec<_>>>()?;
    parsed.sort();
    parsed.dedup();
    Ok(parsed)
}

fn parse_count(field: &str, value: &str) -> ConfigResult<u64> {
    value.parse().map_err(|_| ConfigError::Invalid {
        field: field.to_string(),
        reason: format!("expected a non-negative integer, got '{value}'"),
    })
}

fn parse_bool(field: &str, value: &str) -> ConfigResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            field: field.to_string(),
            reason: format!("expected a boolean, got '{value}'"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[schedule]
timezone = "Europe/Berlin"

[jellyfin]
urls = ["http://primary:8096/", "http://backup:8096"]
api_key = "secret"
content_types = ["Movie", "Music"]

[jellyfin.schedule]
announcement_times = ["20:00", "08:30"]
health_check_interval = "2m"
lookback = "12h"
max_items_per_type = 3

[minecraft]
enabled = true

[[minecraft.servers]]
name = "survival"
urls = ["mc.example.com", "10.0.0.5:25566"]
"#;

    #[test]
    fn parse_and_validate_full_config() {
        let config = MonitorConfig::from_toml_str(FULL).unwrap();
        let settings = config.validate().unwrap();

        assert_eq!(settings.timezone, chrono_tz::Europe::Berlin);
        let jf = settings.jellyfin.unwrap();
        assert_eq!(
            jf.endpoints.addresses(),
            &["http://primary:8096".to_string(), "http://backup:8096".to_string()]
        );
        assert_eq!(jf.content_types, vec![ContentKind::Movie, ContentKind::Audio]);
        assert_eq!(
            jf.announcement_times,
            vec![
                NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(20, 0, 0).unwrap()
            ]
        );
        assert_eq!(jf.health_check_interval, Duration::from_secs(120));
        assert_eq!(jf.lookback, Duration::from_secs(12 * 3600));
        assert_eq!(jf.max_items_per_type, 3);

        let mc = settings.minecraft.unwrap();
        assert_eq!(mc.servers.len(), 1);
        assert_eq!(mc.servers[0].service_id(), "survival");
        assert_eq!(mc.player_check_interval, Duration::from_secs(30));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = MonitorConfig::default();
        assert_eq!(config.schedule.timezone, "America/Los_Angeles");
        assert_eq!(config.jellyfin.schedule.health_check_interval, "5m");
        assert_eq!(config.jellyfin.schedule.lookback, "24h");
        assert_eq!(config.jellyfin.schedule.max_items_per_type, 10);
        assert!(!config.minecraft.enabled);
    }

    #[test]
    fn scaffold_round_trips_through_toml() {
        let config = MonitorConfig::scaffold("http://localhost:8096", "localhost");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("http://localhost:8096"));
        let parsed = MonitorConfig::from_toml_str(&toml_str).unwrap();
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = MonitorConfig::from_toml_str(FULL).unwrap();
        config
            .apply_env([
                ("JELLYFIN_URLS", "http://a, http://b/"),
                ("JELLYFIN_URL", "http://ignored"),
                ("JELLYFIN_LOOKBACK", "48h"),
                ("MINECRAFT_ENABLED", "false"),
                ("SCHEDULE_TIMEZONE", "UTC"),
                ("UNRELATED", "x"),
            ])
            .unwrap();

        let settings = config.validate().unwrap();
        assert_eq!(settings.timezone, chrono_tz::UTC);
        assert!(settings.minecraft.is_none());
        let jf = settings.jellyfin.unwrap();
        assert_eq!(jf.endpoints.addresses(), &["http://a".to_string(), "http://b".to_string()]);
        assert_eq!(jf.lookback, Duration::from_secs(48 * 3600));
    }

    #[test]
    fn single_url_env_fallback() {
        let mut config = MonitorConfig::default();
        config
            .apply_env([("JELLYFIN_URL", "http://only"), ("JELLYFIN_API_KEY", "k")])
            .unwrap();
        let settings = config.validate().unwrap();
        assert_eq!(settings.jellyfin.unwrap().endpoints.primary(), "http://only");
    }

    #[test]
    fn schedule_env_names_are_accepted() {
        let mut config = MonitorConfig::from_toml_str(FULL).unwrap();
        config
            .apply_env([
                ("SCHEDULE_ANNOUNCEMENT_TIMES", "08:30, 20:00"),
                ("SCHEDULE_HEALTH_CHECK_INTERVAL", "5"),
                ("SCHEDULE_LOOKBACK_HOURS", "12"),
            ])
            .unwrap();

        let jf = config.validate().unwrap().jellyfin.unwrap();
        assert_eq!(
            jf.announcement_times,
            vec![
                NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
                NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            ]
        );
        assert_eq!(jf.health_check_interval, Duration::from_secs(5 * 60));
        assert_eq!(jf.lookback, Duration::from_secs(12 * 3600));
    }

    #[test]
    fn jellyfin_env_names_win_over_schedule_names() {
        let mut config = MonitorConfig::from_toml_str(FULL).unwrap();
        config
            .apply_env([
                ("JELLYFIN_ANNOUNCEMENT_TIMES", "07:00"),
                ("SCHEDULE_ANNOUNCEMENT_TIMES", "09:00"),
                ("JELLYFIN_HEALTH_CHECK_INTERVAL", "30s"),
                ("SCHEDULE_HEALTH_CHECK_INTERVAL", "5"),
                ("JELLYFIN_LOOKBACK", "2d"),
                ("SCHEDULE_LOOKBACK_HOURS", "12"),
            ])
            .unwrap();

        let jf = config.validate().unwrap().jellyfin.unwrap();
        assert_eq!(jf.announcement_times, vec![NaiveTime::from_hms_opt(7, 0, 0).unwrap()]);
        assert_eq!(jf.health_check_interval, Duration::from_secs(30));
        assert_eq!(jf.lookback, Duration::from_secs(2 * 86_400));
    }

    #[test]
    fn schedule_env_numbers_must_be_counts() {
        let mut config = MonitorConfig::default();
        let err = config
            .apply_env([("SCHEDULE_LOOKBACK_HOURS", "12h")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "SCHEDULE_LOOKBACK_HOURS"));
    }

    #[test]
    fn env_rejects_bad_bool() {
        let mut config = MonitorConfig::default();
        let err = config.apply_env([("MINECRAFT_ENABLED", "maybe")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "MINECRAFT_ENABLED"));
    }

    #[test]
    fn rejects_missing_urls_and_key() {
        let config = MonitorConfig::default();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::EmptyEndpointSet(ref id) if id == "jellyfin"
        ));

        let mut config = MonitorConfig::default();
        config.jellyfin.urls = vec!["http://a".to_string()];
        assert!(matches!(config.validate().unwrap_err(), ConfigError::Missing(_)));
    }

    #[test]
    fn rejects_bad_schedule_values() {
        let mut config = MonitorConfig::scaffold("http://a", "b");
        config.jellyfin.schedule.announcement_times = vec!["25:00".to_string()];
        assert!(matches!(config.validate().unwrap_err(), ConfigError::InvalidTime(_)));

        let mut config = MonitorConfig::scaffold("http://a", "b");
        config.schedule.timezone = "Mars/Olympus".to_string();
        assert!(matches!(config.validate().unwrap_err(), ConfigError::InvalidTimezone(_)));

        let mut config = MonitorConfig::scaffold("http://a", "b");
        config.jellyfin.content_types = vec!["Podcast".to_string()];
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::UnknownContentKind(_)
        ));
    }

    #[test]
    fn disabled_service_is_not_validated() {
        let mut config = MonitorConfig::scaffold("http://a", "b");
        config.minecraft.enabled = false;
        config.minecraft.schedule.health_check_interval = "nonsense".to_string();
        assert!(config.validate().unwrap().minecraft.is_none());
    }

    #[test]
    fn rejects_duplicate_service_names() {
        let mut config = MonitorConfig::scaffold("http://a", "b");
        config.minecraft.servers.push(MinecraftServerConfig {
            name: "jellyfin".to_string(),
            urls: vec!["c".to_string()],
        });
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::DuplicateService(ref id) if id == "jellyfin"
        ));
    }

    #[test]
    fn rejects_when_nothing_enabled() {
        let mut config = MonitorConfig::default();
        config.jellyfin.enabled = false;
        assert!(matches!(config.validate().unwrap_err(), ConfigError::Invalid { .. }));
    }
}
