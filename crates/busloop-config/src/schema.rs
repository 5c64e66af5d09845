//! Configuration schema definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runloop: RunLoopSection,

    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Services registered on the in-memory bus.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Background loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLoopSection {
    /// Name given to the loop thread.
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for RunLoopSection {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
        }
    }
}

fn default_thread_name() -> String {
    "busloop".to_string()
}

/// The bus name and object path the loop connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_target_service")]
    pub service: String,

    #[serde(default = "default_target_path")]
    pub path: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            service: default_target_service(),
            path: default_target_path(),
        }
    }
}

fn default_target_service() -> String {
    "org.freedesktop.DBus".to_string()
}

fn default_target_path() -> String {
    "/org/freedesktop/DBus".to_string()
}

/// Settings for the `probe` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// How long the CLI waits for a property fetch to report back.
    #[serde(default = "default_probe_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    2
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files (disabled when unset).
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A service registered on the in-memory bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
}

/// One interface of an object exported by a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectConfig {
    pub path: String,

    pub interface: String,

    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}
