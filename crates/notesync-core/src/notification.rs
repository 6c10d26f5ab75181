//! # Notification Wire Payload
//!
//! The single message shape pushed to live client connections.
//!
//! ## Wire Shape
//! ```text
//! {
//!   "type": "heartbeat",
//!   "data": "{\"t\":1700000000000}"      ◄── a JSON *string*, not an object
//! }
//! ```
//!
//! Clients parse `data` a second time. Deployed clients depend on this, so
//! the nesting must be preserved even though it looks redundant.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// Tag sent with every heartbeat.
pub const HEARTBEAT_TYPE: &str = "heartbeat";

/// Tag sent to a user's other devices after a successful push.
pub const TRIGGER_SYNC_TYPE: &str = "triggerSync";

// =============================================================================
// Notification
// =============================================================================

/// A message delivered to live connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Notification {
    /// Message tag, e.g. `"heartbeat"`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Tag-specific fields, JSON-encoded into a string.
    pub data: String,
}

impl Notification {
    /// Builds a notification, encoding `data` into the nested string.
    pub fn new<T: Serialize>(kind: impl Into<String>, data: &T) -> CoreResult<Self> {
        let data = serde_json::to_string(data).map_err(|e| CoreError::Encode(e.to_string()))?;
        Ok(Notification {
            kind: kind.into(),
            data,
        })
    }

    /// Heartbeat stamped with `at`.
    pub fn heartbeat(at: DateTime<Utc>) -> Self {
        Notification {
            kind: HEARTBEAT_TYPE.to_string(),
            data: format!("{{\"t\":{}}}", at.timestamp_millis()),
        }
    }

    /// Tells a user's other devices to pull.
    pub fn trigger_sync(reason: impl Into<String>) -> CoreResult<Self> {
        Notification::new(
            TRIGGER_SYNC_TYPE,
            &TriggerSyncData {
                reason: reason.into(),
            },
        )
    }

    /// Serializes the whole message for the transport.
    pub fn to_json(&self) -> CoreResult<String> {
        serde_json::to_string(self).map_err(|e| CoreError::Encode(e.to_string()))
    }

    /// Parses a message received from the transport.
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Parses the nested `data` string into a typed value.
    pub fn decode_data<T: DeserializeOwned>(&self) -> CoreResult<T> {
        Ok(serde_json::from_str(&self.data)?)
    }

    /// True for heartbeat messages.
    pub fn is_heartbeat(&self) -> bool {
        self.kind == HEARTBEAT_TYPE
    }
}

// =============================================================================
// Data Payloads
// =============================================================================

/// `data` of a heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HeartbeatData {
    /// Unix milliseconds when the tick fired.
    pub t: i64,
}

/// `data` of a trigger-sync message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TriggerSyncData {
    pub reason: String,
}
