//! Dispatcher and logging configuration.
//!
//! # Invariants
//! - Every field has a default; an empty JSON object is a valid config.

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

/// What `submit` does when a collection already has a batch in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// Wait for the in-flight batch to settle, then plan.
    #[default]
    Queue,
    /// Fail immediately with `DispatchError::Busy`.
    Reject,
}

/// Mutation dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub busy_policy: BusyPolicy,
    /// Patch views as soon as a batch is submitted.
    pub optimistic_updates: bool,
    /// Re-fetch affected collections after a batch is applied.
    pub refresh_on_settle: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            busy_policy: BusyPolicy::Queue,
            optimistic_updates: true,
            refresh_on_settle: true,
        }
    }
}

impl DispatcherConfig {
    /// Parses a config from JSON; missing fields take their defaults.
    pub fn from_json_str(value: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(value).map_err(|source| ConfigError {
            section: "dispatcher",
            source,
        })
    }
}

/// Log verbosity accepted in config text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[serde(alias = "warning")]
    Warn,
    Error,
}

impl LogLevel {
    pub fn filter(self) -> LevelFilter {
        match self {
            Self::Trace => LevelFilter::Trace,
            Self::Debug => LevelFilter::Debug,
            Self::Info => LevelFilter::Info,
            Self::Warn => LevelFilter::Warn,
            Self::Error => LevelFilter::Error,
        }
    }
}

/// `Debug` in debug builds, `Info` in release builds.
impl Default for LogLevel {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Debug
        } else {
            Self::Info
        }
    }
}

/// Rolling file log settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Absolute directory receiving `taskboard*.log` files.
    pub dir: PathBuf,
    /// Per-module overrides, e.g. `"taskboard_core::dispatch": "trace"`.
    pub modules: BTreeMap<String, LogLevel>,
    pub max_file_bytes: u64,
    pub keep_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            dir: PathBuf::new(),
            modules: BTreeMap::new(),
            max_file_bytes: 10 * 1024 * 1024,
            keep_files: 5,
        }
    }
}

impl LoggingConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_module(mut self, module: impl Into<String>, level: LogLevel) -> Self {
        self.modules.insert(module.into(), level);
        self
    }

    pub fn from_json_str(value: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(value).map_err(|source| ConfigError {
            section: "logging",
            source,
        })
    }
}

/// Config text could not be parsed.
#[derive(Debug)]
pub struct ConfigError {
    section: &'static str,
    source: serde_json::Error,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid {} config: {}", self.section, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::{BusyPolicy, DispatcherConfig, LogLevel, LoggingConfig};
    use log::LevelFilter;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = DispatcherConfig::from_json_str(r#"{ "busy_policy": "reject" }"#).unwrap();
        assert_eq!(config.busy_policy, BusyPolicy::Reject);
        assert!(config.optimistic_updates);
        assert!(config.refresh_on_settle);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        let err = DispatcherConfig::from_json_str(r#"{ "busy_policy": "drop" }"#).unwrap_err();
        assert!(err.to_string().contains("invalid dispatcher config"));
    }

    #[test]
    fn logging_config_reads_levels_and_module_overrides() {
        let config = LoggingConfig::from_json_str(
            r#"{
                "level": "warning",
                "dir": "/var/log/taskboard",
                "modules": { "taskboard_core::dispatch": "trace" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.level.filter(), LevelFilter::Warn);
        assert_eq!(
            config.modules.get("taskboard_core::dispatch"),
            Some(&LogLevel::Trace)
        );
        assert_eq!(config.keep_files, 5);
    }

    #[test]
    fn logging_config_rejects_unknown_level() {
        let err = LoggingConfig::from_json_str(r#"{ "level": "loud" }"#).unwrap_err();
        assert!(err.to_string().starts_with("invalid logging config"));
    }
}
