//! Configuration for the coordination server.
//!
//! Layered: built-in defaults, then `.aiswarm/config.toml`, then
//! `AISWARM_`-prefixed environment variables. Every section has defaults so
//! a bare checkout works with no configuration at all.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub monitor: MonitorSettings,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
    pub launcher: LauncherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            monitor: MonitorSettings::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
            launcher: LauncherConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration rooted at `base_dir` (the server's working
    /// directory).
    pub fn load(base_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = base_dir.join(".aiswarm").join("config.toml");
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("AISWARM_").split("__"))
            .extract()
            .map_err(|e| ConfigError::Load(Box::new(e)))
    }

    /// sqlx URL for the coordination database under `base_dir`.
    pub fn database_url(&self, base_dir: &Path) -> String {
        let path = Path::new(&self.database.path);
        if path.is_absolute() {
            format!("sqlite:{}", path.display())
        } else {
            format!("sqlite:{}", base_dir.join(path).display())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file, relative to the working directory.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".aiswarm/coordination.db".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub heartbeat_timeout_secs: u64,
    pub check_interval_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self { heartbeat_timeout_secs: 300, check_interval_secs: 60 }
    }
}

impl MonitorSettings {
    pub fn to_monitor_config(&self) -> crate::services::agent_monitor::MonitorConfig {
        crate::services::agent_monitor::MonitorConfig {
            heartbeat_timeout: std::time::Duration::from_secs(self.heartbeat_timeout_secs),
            check_interval: std::time::Duration::from_secs(self.check_interval_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Wait applied to `get_next_task` when the caller omits `waitMillis`.
    pub default_wait_millis: u64,
    /// How long the event logger may drain on shutdown.
    pub logger_drain_millis: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { default_wait_millis: 30_000, logger_drain_millis: 5_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    pub format: LogFormat,
    /// Directory for rotated log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty, log_dir: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Program invoked to run an agent process.
    pub program: String,
    /// Extra arguments placed before the generated ones.
    pub args: Vec<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self { program: "claude".to_string(), args: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable_without_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.database_url(dir.path()).ends_with(".aiswarm/coordination.db"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let swarm_dir = dir.path().join(".aiswarm");
        std::fs::create_dir_all(&swarm_dir).unwrap();
        std::fs::write(
            swarm_dir.join("config.toml"),
            "[monitor]\nheartbeat_timeout_secs = 30\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.monitor.heartbeat_timeout_secs, 30);
        assert_eq!(config.monitor.check_interval_secs, 60);
        assert_eq!(config.logging.level, "debug");
    }
}
