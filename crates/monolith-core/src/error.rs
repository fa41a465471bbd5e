//! Error types shared across Monolith crates.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::types::ServiceId;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building configuration-time values.
///
/// All of these are fatal at startup and never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("service '{0}' has no endpoints configured")]
    EmptyEndpointSet(ServiceId),

    #[error("service '{service}' has a blank address at position {index}")]
    BlankAddress { service: ServiceId, index: usize },

    #[error("invalid time format '{0}': expected HH:MM")]
    InvalidTime(String),

    #[error("invalid duration for {field}: '{value}'")]
    InvalidDuration { field: String, value: String },

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),

    #[error("unknown content type '{0}'")]
    UnknownContentKind(String),

    #[error("duplicate service name '{0}'")]
    DuplicateService(String),

    #[error("missing required setting: {0}")]
    Missing(String),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Why a single probe or listing call against one address failed.
///
/// These are expected and frequent. The health engine turns them into
/// `reachable = false` observations instead of propagating them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("probe of {address} timed out after {timeout:?}")]
    Timeout { address: String, timeout: Duration },

    #[error("cannot connect to {address}: {reason}")]
    Unreachable { address: String, reason: String },

    /// The endpoint answered, but not with something we understand.
    #[error("remote protocol error from {address}: {reason}")]
    Protocol { address: String, reason: String },
}

impl ProbeError {
    pub fn timeout(address: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            address: address.into(),
            timeout,
        }
    }

    pub fn unreachable(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unreachable {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    pub fn protocol(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::Protocol {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// The address the failure was observed against.
    pub fn address(&self) -> &str {
        match self {
            Self::Timeout { address, .. }
            | Self::Unreachable { address, .. }
            | Self::Protocol { address, .. } => address,
        }
    }

    /// Whether the endpoint was reachable but spoke an unexpected protocol.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_error_reports_address() {
        let err = ProbeError::timeout("a:1", Duration::from_secs(2));
        assert_eq!(err.address(), "a:1");
        assert!(!err.is_protocol());

        let err = ProbeError::protocol("http://b", "bad json");
        assert!(err.is_protocol());
        assert_eq!(
            err.to_string(),
            "remote protocol error from http://b: bad json"
        );
    }

    #[test]
    fn config_error_messages() {
        let err = ConfigError::InvalidTime("25:00".to_string());
        assert_eq!(err.to_string(), "invalid time format '25:00': expected HH:MM");
    }
}
