//! livepush - live media publishing session controller
//!
//! Parses RTMP-style endpoints, drives a pluggable media transport through
//! connect, device attach and publish with a single retry, watches the
//! connection while streaming and reports everything through a status
//! channel and an event bus.

pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod session;
pub mod target;
pub mod transport;
pub mod utils;

pub use error::{AppError, Result};
