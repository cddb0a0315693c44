//! Configuration management
//!
//! A TOML file with `[sync]` and `[logging]` sections, with `POSTSYNC_*`
//! environment variables overlaid on the defaults.

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Replica and shared-location settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name of this replica, shown in logs and reports
    pub replica_id: String,

    /// Directory holding this replica's own copy
    pub local_dir: PathBuf,

    /// Shared folder; sync is skipped while unset
    pub shared_dir: Option<PathBuf>,

    pub enabled: bool,

    /// Period of the background scheduler
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Sync right after each local create/delete
    pub sync_on_change: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub json_format: bool,
    pub with_target: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            replica_id: default_replica_id(),
            local_dir: PathBuf::from("./postsync-data"),
            shared_dir: None,
            enabled: true,
            interval: Duration::from_secs(300),
            sync_on_change: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            with_target: true,
        }
    }
}

fn default_replica_id() -> String {
    env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn parse_var<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables follow the pattern POSTSYNC_<SECTION>_<KEY>, for example
    /// POSTSYNC_SYNC_SHARED_DIR=/mnt/cloud/postsync
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay any POSTSYNC_* variables onto this configuration
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| env::var(name).ok())
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        // Sync config
        if let Some(id) = lookup("POSTSYNC_SYNC_REPLICA_ID") {
            self.sync.replica_id = id;
        }
        if let Some(dir) = lookup("POSTSYNC_SYNC_LOCAL_DIR") {
            self.sync.local_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("POSTSYNC_SYNC_SHARED_DIR") {
            // An empty value unsets the shared folder
            self.sync.shared_dir = if dir.trim().is_empty() { None } else { Some(PathBuf::from(dir)) };
        }
        if let Some(enabled) = lookup("POSTSYNC_SYNC_ENABLED") {
            self.sync.enabled = parse_var("POSTSYNC_SYNC_ENABLED", &enabled)?;
        }
        if let Some(interval) = lookup("POSTSYNC_SYNC_INTERVAL") {
            self.sync.interval = humantime_serde::re::humantime::parse_duration(interval.trim()).map_err(|e| {
                ConfigError::InvalidValue {
                    var: "POSTSYNC_SYNC_INTERVAL".to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(on_change) = lookup("POSTSYNC_SYNC_ON_CHANGE") {
            self.sync.sync_on_change = parse_var("POSTSYNC_SYNC_ON_CHANGE", &on_change)?;
        }

        // Logging config
        if let Some(level) = lookup("POSTSYNC_LOG_LEVEL") {
            self.logging.level = parse_var("POSTSYNC_LOG_LEVEL", &level)?;
        }
        if let Some(json) = lookup("POSTSYNC_LOG_JSON") {
            self.logging.json_format = parse_var("POSTSYNC_LOG_JSON", &json)?;
        }

        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(format!("{}: {}", path.as_ref().display(), e)))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.replica_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "replica_id must not be empty".to_string(),
            ));
        }

        if self.sync.interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "interval must be greater than 0".to_string(),
            ));
        }

        if self.sync.shared_dir.as_deref() == Some(self.sync.local_dir.as_path()) {
            return Err(ConfigError::ValidationFailed(
                "shared_dir must differ from local_dir".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to file, creating parent directories
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::FileWriteError(e.to_string()))?;
        }
        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.sync.enabled);
        assert!(config.sync.shared_dir.is_none());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.sync.interval = Duration::ZERO;
        assert!(config.validate().is_err());

        config = Config::default();
        config.sync.replica_id = "  ".to_string();
        assert!(config.validate().is_err());

        config = Config::default();
        config.sync.shared_dir = Some(config.sync.local_dir.clone());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overlay() {
        let mut config = Config::default();
        config
            .apply_vars(vars(&[
                ("POSTSYNC_SYNC_REPLICA_ID", "phone"),
                ("POSTSYNC_SYNC_SHARED_DIR", "/mnt/cloud"),
                ("POSTSYNC_SYNC_ENABLED", "false"),
                ("POSTSYNC_SYNC_INTERVAL", "90s"),
                ("POSTSYNC_SYNC_ON_CHANGE", "true"),
                ("POSTSYNC_LOG_LEVEL", "debug"),
                ("POSTSYNC_LOG_JSON", "true"),
            ]))
            .unwrap();

        assert_eq!(config.sync.replica_id, "phone");
        assert_eq!(config.sync.shared_dir, Some(PathBuf::from("/mnt/cloud")));
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.interval, Duration::from_secs(90));
        assert!(config.sync.sync_on_change);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_env_invalid_values() {
        let mut config = Config::default();
        let err = config.apply_vars(vars(&[("POSTSYNC_SYNC_ENABLED", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("POSTSYNC_SYNC_ENABLED"));

        assert!(config.apply_vars(vars(&[("POSTSYNC_SYNC_INTERVAL", "soon")])).is_err());
        assert!(config.apply_vars(vars(&[("POSTSYNC_LOG_LEVEL", "loud")])).is_err());
    }

    #[test]
    fn test_empty_shared_dir_unsets() {
        let mut config = Config::default();
        config.sync.shared_dir = Some(PathBuf::from("/mnt/cloud"));
        config.apply_vars(vars(&[("POSTSYNC_SYNC_SHARED_DIR", "")])).unwrap();
        assert!(config.sync.shared_dir.is_none());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("postsync.toml");

        let mut config = Config::default();
        config.sync.replica_id = "laptop".to_string();
        config.sync.shared_dir = Some(dir.path().join("shared"));
        config.sync.interval = Duration::from_secs(120);
        config.logging.level = LogLevel::Warn;
        config.save_to_file(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("interval = \"2m\""));
        assert!(contents.contains("level = \"warn\""));

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("postsync.toml");
        std::fs::write(&path, "[sync]\nreplica_id = \"tablet\"\ninterval = \"10m\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.sync.replica_id, "tablet");
        assert_eq!(config.sync.interval, Duration::from_secs(600));
        assert!(config.sync.enabled);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_missing_and_malformed_files() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            Config::from_file(dir.path().join("absent.toml")),
            Err(ConfigError::FileReadError(_))
        ));

        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[sync\n").unwrap();
        assert!(matches!(Config::from_file(&path), Err(ConfigError::ParseError(_))));
    }
}
