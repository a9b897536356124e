//! Status surface
//!
//! Last-write-wins view of the session for observers. Only the state context
//! holds the writer; everyone else gets a `watch::Receiver`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use super::SessionState;

/// Most recent human-readable status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl StatusMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Snapshot published to observers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub is_publishing: bool,
    pub message: StatusMessage,
}

impl SessionStatus {
    pub fn text(&self) -> &str {
        &self.message.text
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            state: SessionState::Idle,
            is_publishing: false,
            message: StatusMessage::new(status_text::READY),
        }
    }
}

/// Status strings shown to observers
pub mod status_text {
    pub const READY: &str = "ready";
    pub const STARTING: &str = "starting";
    pub const INVALID_TARGET: &str = "invalid target";
    pub const STREAMING: &str = "connected and streaming";
    pub const CONNECTING: &str = "connecting";
    pub const CONNECTION_LOST: &str = "connection lost - check network";
    pub const CONNECTION_FAILED: &str = "connection failed";
    pub const STOPPING: &str = "stopping";
    pub const STOPPED: &str = "stopped";
}

/// Single writer side of the status surface
pub(crate) struct StatusSurface {
    tx: watch::Sender<SessionStatus>,
}

impl StatusSurface {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionStatus::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.tx.subscribe()
    }

    #[cfg(test)]
    pub fn current(&self) -> SessionStatus {
        self.tx.borrow().clone()
    }

    /// Record a new state, keeping the current text
    pub fn set_state(&self, state: SessionState) {
        self.tx.send_modify(|status| {
            status.state = state;
            status.is_publishing = state.is_publishing();
        });
    }

    /// Replace the status text; repeating the same text refreshes the timestamp
    pub fn set_text(&self, text: &str) {
        self.tx.send_modify(|status| {
            status.message = StatusMessage::new(text);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        let surface = StatusSurface::new();
        let status = surface.current();
        assert_eq!(status.state, SessionState::Idle);
        assert!(!status.is_publishing);
        assert_eq!(status.text(), status_text::READY);
    }

    #[test]
    fn test_publishing_flag_follows_state() {
        let surface = StatusSurface::new();
        let rx = surface.subscribe();

        surface.set_state(SessionState::Monitoring);
        assert!(rx.borrow().is_publishing);

        surface.set_state(SessionState::Stopping);
        assert!(!rx.borrow().is_publishing);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let surface = StatusSurface::new();
        let mut rx = surface.subscribe();

        surface.set_text(status_text::STARTING);
        surface.set_text(status_text::STREAMING);

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().text(), status_text::STREAMING);
    }
}
