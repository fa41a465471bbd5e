//! Parsing helpers for human-written configuration values.

use std::time::Duration;

use chrono::NaiveTime;

use crate::error::{ConfigError, ConfigResult};

/// Parse a duration string like "500ms", "30s", "5m", "24h", or "7d".
///
/// A bare number is taken as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled(hours, 60 * 60)
    } else if let Some(days) = s.strip_suffix('d') {
        scaled(days, 24 * 60 * 60)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

fn scaled(value: &str, unit_secs: u64) -> Option<Duration> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|v| v.checked_mul(unit_secs))
        .map(Duration::from_secs)
}

/// Parse a named duration field, reporting the field on failure.
pub fn duration_field(field: &str, value: &str) -> ConfigResult<Duration> {
    match parse_duration(value) {
        Some(d) if !d.is_zero() => Ok(d),
        _ => Err(ConfigError::InvalidDuration {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse a 24-hour "HH:MM" time of day.
pub fn parse_time_of_day(s: &str) -> ConfigResult<NaiveTime> {
    let invalid = || ConfigError::InvalidTime(s.to_string());
    let (hours, minutes) = s.trim().split_once(':').ok_or_else(invalid)?;
    if hours.is_empty() || hours.len() > 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours: u32 = hours.parse().map_err(|_| invalid())?;
    let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hours, minutes, 0).ok_or_else(invalid)
}

/// Split a comma-separated list, dropping empty entries.
pub fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}
