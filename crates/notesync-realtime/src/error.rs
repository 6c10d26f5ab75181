//! # Realtime Error Types
//!
//! Error types for live connections and the hub.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Realtime Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Delivery      │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Disconnected   │  │  ProtocolError          │ │
//! │  │  ConfigLoad     │  │  SendTimeout    │  │  SerializationFailed    │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Delivery errors never leave the fan-out: they are logged and counted  │
//! │  in the DeliveryReport.                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Realtime error type.
#[derive(Debug, Error)]
pub enum RealtimeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid realtime configuration.
    #[error("Invalid realtime configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Delivery Errors
    // =========================================================================
    /// The connection's transport is gone.
    #[error("Connection closed")]
    Disconnected,

    /// A send did not finish within the per-send timeout.
    #[error("Send timed out after {0} ms")]
    SendTimeout(u64),

    // =========================================================================
    // Transport & Protocol Errors
    // =========================================================================
    /// Listener or socket failure.
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The peer broke the handshake protocol.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Failed to serialize a message.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::SerializationFailed(err.to_string())
    }
}

impl From<notesync_core::CoreError> for RealtimeError {
    fn from(err: notesync_core::CoreError) -> Self {
        RealtimeError::SerializationFailed(err.to_string())
    }
}

impl From<std::io::Error> for RealtimeError {
    fn from(err: std::io::Error) -> Self {
        RealtimeError::TransportError(err.to_string())
    }
}

impl From<toml::de::Error> for RealtimeError {
    fn from(err: toml::de::Error) -> Self {
        RealtimeError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl RealtimeError {
    /// True for per-connection delivery failures.
    pub fn is_delivery_failure(&self) -> bool {
        matches!(
            self,
            RealtimeError::Disconnected | RealtimeError::SendTimeout(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RealtimeError::InvalidConfig(_) | RealtimeError::ConfigLoadFailed(_)
        )
    }
}
