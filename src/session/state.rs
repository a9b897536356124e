use serde::{Deserialize, Serialize};

/// Publishing session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Nothing running; initial state
    #[default]
    Idle,
    /// Parsing, connecting, attaching devices and publishing
    Connecting,
    /// Publish acknowledged
    Publishing,
    /// Publishing with the connection monitor running
    Monitoring,
    /// Teardown in progress
    Stopping,
    /// Last start did not reach the server; waits for a new start or reset
    Failed,
}

impl SessionState {
    /// Whether `start()` is accepted in this state
    pub fn can_start(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }

    /// Whether media is (supposed to be) flowing
    pub fn is_publishing(self) -> bool {
        matches!(self, Self::Publishing | Self::Monitoring)
    }

    /// No progress without a new command
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }

    /// Allowed edges of the state machine
    ///
    /// `Stopping` is reachable from everywhere because `reset()` is
    /// unconditional; `Idle` only from `Stopping`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (_, Stopping) => true,
            (Idle | Failed, Connecting) => true,
            (Connecting, Publishing | Failed) => true,
            (Publishing, Monitoring | Failed) => true,
            (Stopping, Idle) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Publishing => write!(f, "publishing"),
            Self::Monitoring => write!(f, "monitoring"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
