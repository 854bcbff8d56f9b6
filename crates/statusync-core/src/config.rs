//! Config - 起動ハンドシェイクと activity registry の設定
//!
//! JSON で読み込み、欠けているフィールドは既定値で埋める。

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const ENV_STATUSYNC_CONFIG: &str = "STATUSYNC_CONFIG";

const DEFAULT_CHECK_INTERVAL_MS: u64 = 500;
const DEFAULT_MAX_WAIT_MS: u64 = 60_000;
const DEFAULT_REDIRECT_DELAY_MS: u64 = 300;
const DEFAULT_QUERY_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_RESTART_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_VERSION_PROBE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_VERSION_PROBE_POLL_MS: u64 = 100;
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusyncConfig {
    #[serde(default)]
    pub launcher: LauncherConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
}

/// Timing of the readiness handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Grace delay between the success message and the handoff.
    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,
    /// Upper bound for a single status query; a query that runs longer is a transport failure.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    /// A restart that has not answered by then counts as a failed restart.
    #[serde(default = "default_restart_timeout_ms")]
    pub restart_timeout_ms: u64,
    #[serde(default = "default_version_probe_timeout_ms")]
    pub version_probe_timeout_ms: u64,
    #[serde(default = "default_version_probe_poll_ms")]
    pub version_probe_poll_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            max_wait_ms: DEFAULT_MAX_WAIT_MS,
            redirect_delay_ms: DEFAULT_REDIRECT_DELAY_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            restart_timeout_ms: DEFAULT_RESTART_TIMEOUT_MS,
            version_probe_timeout_ms: DEFAULT_VERSION_PROBE_TIMEOUT_MS,
            version_probe_poll_ms: DEFAULT_VERSION_PROBE_POLL_MS,
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl LauncherConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn restart_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_timeout_ms)
    }

    pub fn version_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.version_probe_timeout_ms)
    }

    pub fn version_probe_poll(&self) -> Duration {
        Duration::from_millis(self.version_probe_poll_ms)
    }
}

impl StatusyncConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: StatusyncConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// `$STATUSYNC_CONFIG` が未設定なら既定値。
    pub fn load_from_env() -> Result<Self, ConfigError> {
        match std::env::var(ENV_STATUSYNC_CONFIG) {
            Ok(path) if !path.trim().is_empty() => Self::load(path.trim()),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let launcher = &self.launcher;
        if launcher.check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "launcher.check_interval_ms must be greater than 0".to_string(),
            ));
        }
        if launcher.max_wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "launcher.max_wait_ms must be greater than 0".to_string(),
            ));
        }
        if launcher.redirect_delay_ms >= launcher.max_wait_ms {
            return Err(ConfigError::Invalid(format!(
                "launcher.redirect_delay_ms ({}) must be shorter than launcher.max_wait_ms ({})",
                launcher.redirect_delay_ms, launcher.max_wait_ms
            )));
        }
        if launcher.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "launcher.query_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if launcher.restart_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "launcher.restart_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if launcher.version_probe_poll_ms == 0 {
            return Err(ConfigError::Invalid(
                "launcher.version_probe_poll_ms must be greater than 0".to_string(),
            ));
        }
        if self.activity.broadcast_capacity == 0 {
            return Err(ConfigError::Invalid(
                "activity.broadcast_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_check_interval_ms() -> u64 {
    DEFAULT_CHECK_INTERVAL_MS
}

fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT_MS
}

fn default_redirect_delay_ms() -> u64 {
    DEFAULT_REDIRECT_DELAY_MS
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

fn default_restart_timeout_ms() -> u64 {
    DEFAULT_RESTART_TIMEOUT_MS
}

fn default_version_probe_timeout_ms() -> u64 {
    DEFAULT_VERSION_PROBE_TIMEOUT_MS
}

fn default_version_probe_poll_ms() -> u64 {
    DEFAULT_VERSION_PROBE_POLL_MS
}

fn default_broadcast_capacity() -> usize {
    DEFAULT_BROADCAST_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StatusyncConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StatusyncConfig::default());
        assert_eq!(config.launcher.check_interval(), Duration::from_millis(500));
        assert_eq!(config.launcher.max_wait(), Duration::from_secs(60));
        assert_eq!(config.launcher.redirect_delay(), Duration::from_millis(300));
        assert_eq!(config.launcher.version_probe_timeout(), Duration::from_secs(5));
        assert_eq!(config.launcher.restart_timeout(), Duration::from_secs(30));
        assert_eq!(config.activity.broadcast_capacity, 256);
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config =
            StatusyncConfig::from_json_str(r#"{"launcher": {"max_wait_ms": 10000}}"#).unwrap();
        assert_eq!(config.launcher.max_wait_ms, 10_000);
        assert_eq!(config.launcher.check_interval_ms, 500);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = StatusyncConfig::from_json_str(r#"{"launcher": {"check_interval_ms": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("check_interval_ms")));
    }

    #[test]
    fn zero_restart_timeout_is_rejected() {
        let err = StatusyncConfig::from_json_str(r#"{"launcher": {"restart_timeout_ms": 0}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("restart_timeout_ms")));
    }

    #[test]
    fn grace_delay_must_fit_in_budget() {
        let err = StatusyncConfig::from_json_str(
            r#"{"launcher": {"max_wait_ms": 200, "redirect_delay_ms": 300}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("redirect_delay_ms")));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = StatusyncConfig::from_json_str("{launcher:").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = StatusyncConfig::load("/definitely/not/here/statusync.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
