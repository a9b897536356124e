//! Publishing session
//!
//! The controller runs two contexts: the state context owns [`SessionState`]
//! and the status surface, the control context performs all transport and
//! device work in order. Results flow back as messages tagged with the
//! generation that requested them, so late completions of a superseded
//! attempt are dropped.

mod control;
mod controller;
mod monitor;
mod state;
mod status;

pub use control::PUBLISH_ATTEMPTS;
pub use controller::{Collaborators, SessionController};
pub use monitor::ConnectionHealth;
pub use state::SessionState;
pub use status::{status_text, SessionStatus, StatusMessage};
