use thiserror::Error;

use crate::device::DeviceKind;

/// Endpoint string could not be turned into a connection target
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid URI '{input}': {reason}")]
    InvalidUri { input: String, reason: String },

    #[error("Invalid port in '{0}': must be 1-65535")]
    InvalidPort(String),

    #[error("URI '{0}' has no hierarchical path")]
    NotHierarchical(String),
}

/// Failure reported by the media transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect to {target} failed: {reason}")]
    Connect { target: String, reason: String },

    #[error("Publish of stream rejected: {0}")]
    Publish(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Attach {kind} failed: {reason}")]
    Attach { kind: DeviceKind, reason: String },

    #[error("Close failed: {0}")]
    Close(String),
}

/// Capture device could not be bound to the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission for {0} was not granted")]
    PermissionDenied(DeviceKind),

    #[error("No {kind} device available: {reason}")]
    Unavailable { kind: DeviceKind, reason: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid target: {0}")]
    InvalidTarget(#[from] ParseError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session controller has shut down")]
    ControllerGone,
}

pub type Result<T> = std::result::Result<T, AppError>;
