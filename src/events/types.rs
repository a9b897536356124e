//! Session event types
//!
//! Defines all events broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::device::DeviceKind;
use crate::session::SessionState;

/// Session event for observers
///
/// Serialized as `{"event": "<name>", "data": { ... }}`:
///
/// ```json
/// {
///   "event": "session.state_changed",
///   "data": { "from": "connecting", "to": "publishing" }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// State machine moved
    #[serde(rename = "session.state_changed")]
    StateChanged {
        from: SessionState,
        to: SessionState,
    },

    /// Status text changed
    #[serde(rename = "session.status")]
    StatusChanged {
        text: String,
        is_publishing: bool,
    },

    /// A `start()` arrived while a session was already in flight
    #[serde(rename = "session.start_ignored")]
    StartIgnored {
        /// State the controller was in
        state: SessionState,
    },

    /// A capture device could not be bound; publishing continues without it
    #[serde(rename = "device.unavailable")]
    DeviceUnavailable {
        kind: DeviceKind,
        reason: String,
    },

    /// Publish did not succeed after the retry
    #[serde(rename = "session.failed")]
    SessionFailed {
        reason: String,
    },

    /// The monitor saw the connection drop after it had been up
    #[serde(rename = "connection.lost")]
    ConnectionLost {
        /// Target without stream key, e.g. `rtmp://host:1935/app`
        target: String,
    },

    /// The connected flag came back after a loss
    #[serde(rename = "connection.restored")]
    ConnectionRestored {
        target: String,
    },
}
