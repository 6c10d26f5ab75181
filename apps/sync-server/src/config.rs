//! Server configuration.
//!
//! Loaded from a TOML file, then overridden from `NOTESYNC_*` environment
//! variables, then validated. Every field has a default, so an empty file
//! (or no file) yields a working local setup.
//!
//! ```toml
//! [database]
//! path = "notesync.db"
//! max_connections = 10
//!
//! [realtime]
//! heartbeat_interval_secs = 5
//!
//! [realtime.hub]
//! port = 8765
//!
//! [logging]
//! level = "info"
//!
//! [metrics]
//! prometheus_addr = "0.0.0.0:9000"
//!
//! [sync]
//! fetch_limit = 1000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use notesync_db::DbConfig;
use notesync_realtime::RealtimeConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};

// =============================================================================
// Sections
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    "notesync.db".to_string()
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }

    /// Pool configuration for this section.
    pub fn db_config(&self) -> DbConfig {
        if self.is_in_memory() {
            DbConfig::in_memory()
        } else {
            DbConfig::new(PathBuf::from(&self.path)).max_connections(self.max_connections)
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_log_level(),
            json: false,
        }
    }
}

/// `[metrics]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Address for the Prometheus scrape listener. Unset disables it.
    #[serde(default)]
    pub prometheus_addr: Option<String>,
}

/// `[sync]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Items returned per collection by one fetch.
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: u32,
}

fn default_fetch_limit() -> u32 {
    1000
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            fetch_limit: default_fetch_limit(),
        }
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Complete server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl ServerConfig {
    /// Loads `path` (if given and present), applies env overrides and
    /// validates.
    pub fn load(path: Option<&Path>) -> ServerResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "Loading config file");
                let contents = std::fs::read_to_string(path).map_err(|e| {
                    ServerError::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&contents)?
            }
            Some(path) => {
                warn!(path = %path.display(), "Config file not found, using defaults");
                ServerConfig::default()
            }
            None => ServerConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parses a config document without env overrides.
    pub fn from_toml(contents: &str) -> ServerResult<Self> {
        toml::from_str(contents).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Applies `NOTESYNC_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("NOTESYNC_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = path;
        }

        if let Ok(level) = std::env::var("NOTESYNC_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(addr) = std::env::var("NOTESYNC_PROMETHEUS_ADDR") {
            self.metrics.prometheus_addr = Some(addr);
        }

        self.realtime.apply_env_overrides();
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ServerResult<()> {
        if self.database.path.is_empty() {
            return Err(ServerError::Config("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(ServerError::Config(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.sync.fetch_limit == 0 {
            return Err(ServerError::Config(
                "sync.fetch_limit must be greater than 0".into(),
            ));
        }

        if let Some(addr) = &self.metrics.prometheus_addr {
            addr.parse::<SocketAddr>().map_err(|_| {
                ServerError::Config(format!("metrics.prometheus_addr is not an address: {}", addr))
            })?;
        }

        self.realtime
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config.database.path, "notesync.db");
        assert_eq!(config.realtime.heartbeat_interval_secs, 5);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sync.fetch_limit, 1000);
        assert!(config.metrics.prometheus_addr.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sections_parse() {
        let config = ServerConfig::from_toml(
            r#"
            [database]
            path = ":memory:"

            [realtime]
            send_timeout_ms = 750

            [realtime.hub]
            port = 9100

            [logging]
            level = "debug"
            json = true
            "#,
        )
        .unwrap();

        assert!(config.database.is_in_memory());
        assert!(config.database.db_config().is_in_memory());
        assert_eq!(config.realtime.send_timeout_ms, 750);
        assert_eq!(config.realtime.hub.port, 9100);
        assert!(config.logging.json);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.sync.fetch_limit = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.metrics.prometheus_addr = Some("not an address".into());
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.realtime.heartbeat_interval_secs = 0;
        assert!(matches!(config.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = ServerConfig::load(Some(Path::new("/nonexistent/notesync.toml"))).unwrap();
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        assert!(matches!(
            ServerConfig::from_toml("[database\npath = 1"),
            Err(ServerError::Config(_))
        ));
    }
}
