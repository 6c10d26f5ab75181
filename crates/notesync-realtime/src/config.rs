//! # Realtime Configuration
//!
//! Settings for live connections: heartbeat cadence, fan-out timeouts and
//! the WebSocket hub.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     NOTESYNC_HEARTBEAT_INTERVAL_SECS=5                                 │
//! │     NOTESYNC_HUB_PORT=8765                                             │
//! │                                                                         │
//! │  2. TOML Config File ([realtime] section of the server config)         │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [realtime]
//! heartbeat_interval_secs = 5
//! send_timeout_ms = 2000
//! channel_capacity = 64
//!
//! [realtime.hub]
//! port = 8765
//! bind_addr = "0.0.0.0"
//! hello_timeout_secs = 10
//! ping_interval_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{RealtimeError, RealtimeResult};

// =============================================================================
// Hub Server Settings
// =============================================================================

/// Configuration for the WebSocket hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSettings {
    /// Port for the WebSocket server. 0 picks a free port.
    #[serde(default = "default_hub_port")]
    pub port: u16,

    /// Bind address (default: 0.0.0.0 for all interfaces).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// How long a new socket may take to send its Hello (seconds).
    #[serde(default = "default_hello_timeout")]
    pub hello_timeout_secs: u64,

    /// Interval between WebSocket pings (seconds).
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Largest accepted inbound frame (bytes).
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_hub_port() -> u16 {
    8765
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_hello_timeout() -> u64 {
    10
}

fn default_ping_interval() -> u64 {
    30
}

fn default_max_message_size() -> usize {
    64 * 1024
}

impl Default for HubSettings {
    fn default() -> Self {
        HubSettings {
            port: default_hub_port(),
            bind_addr: default_bind_addr(),
            hello_timeout_secs: default_hello_timeout(),
            ping_interval_secs: default_ping_interval(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl HubSettings {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }
}

// =============================================================================
// Realtime Configuration
// =============================================================================

/// Complete realtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Seconds between heartbeats.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Upper bound on one send to one connection (milliseconds).
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,

    /// Outgoing queue size per connection.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Hub server settings.
    #[serde(default)]
    pub hub: HubSettings,
}

fn default_heartbeat_interval() -> u64 {
    5
}

fn default_send_timeout() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        RealtimeConfig {
            heartbeat_interval_secs: default_heartbeat_interval(),
            send_timeout_ms: default_send_timeout(),
            channel_capacity: default_channel_capacity(),
            hub: HubSettings::default(),
        }
    }
}

impl RealtimeConfig {
    /// Parses a standalone `[realtime]` document.
    pub fn from_toml(contents: &str) -> RealtimeResult<Self> {
        let config: RealtimeConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> RealtimeResult<()> {
        if self.heartbeat_interval_secs == 0 {
            return Err(RealtimeError::InvalidConfig(
                "heartbeat_interval_secs must be greater than 0".into(),
            ));
        }

        if self.send_timeout_ms == 0 {
            return Err(RealtimeError::InvalidConfig(
                "send_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.channel_capacity == 0 {
            return Err(RealtimeError::InvalidConfig(
                "channel_capacity must be greater than 0".into(),
            ));
        }

        if self.hub.bind_addr.is_empty() {
            return Err(RealtimeError::InvalidConfig(
                "hub.bind_addr must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Applies `NOTESYNC_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(secs) = std::env::var("NOTESYNC_HEARTBEAT_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => {
                    debug!(secs = s, "Overriding heartbeat interval from environment");
                    self.heartbeat_interval_secs = s;
                }
                Err(_) => warn!(value = %secs, "Ignoring invalid NOTESYNC_HEARTBEAT_INTERVAL_SECS"),
            }
        }

        if let Ok(ms) = std::env::var("NOTESYNC_SEND_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.send_timeout_ms = ms;
            }
        }

        if let Ok(port) = std::env::var("NOTESYNC_HUB_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding hub port from environment");
                self.hub.port = p;
            }
        }

        if let Ok(addr) = std::env::var("NOTESYNC_HUB_BIND") {
            self.hub.bind_addr = addr;
        }
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
        assert_eq!(config.hub.port, 8765);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RealtimeConfig::from_toml(
            r#"
            send_timeout_ms = 500

            [hub]
            port = 9000
            bind_addr = "127.0.0.1"
            "#,
        )
        .unwrap();

        assert_eq!(config.send_timeout(), Duration::from_millis(500));
        assert_eq!(config.heartbeat_interval_secs, 5);
        assert_eq!(config.hub.bind_address(), "127.0.0.1:9000");
        assert_eq!(config.hub.hello_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_config_validation() {
        let mut config = RealtimeConfig::default();
        config.heartbeat_interval_secs = 0;
        assert!(config.validate().is_err());

        let mut config = RealtimeConfig::default();
        config.channel_capacity = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        assert!(RealtimeConfig::from_toml("send_timeout_ms = 0").is_err());
    }
}
