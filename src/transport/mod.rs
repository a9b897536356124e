//! External collaborators
//!
//! The session controller drives a media transport, a device provider and a
//! permission provider. None of them are implemented here; the traits are the
//! seam, and [`simulated`] offers scriptable in-process versions.

pub mod simulated;

use async_trait::async_trait;

use crate::config::StreamSettings;
use crate::device::{DeviceGrants, DeviceHandle, DeviceKind};
use crate::error::{DeviceError, TransportError};
use crate::target::ConnectionTarget;

/// Network connection and publishing primitive
///
/// Implementations own the actual connection object; the controller only
/// opens and closes it.
#[async_trait]
pub trait MediaTransport: Send + Sync {
    /// Apply quality and audio parameters before connecting
    async fn configure(&self, settings: &StreamSettings) -> Result<(), TransportError>;

    /// Open the connection; resolves once the handshake has completed
    async fn connect(&self, target: &ConnectionTarget) -> Result<(), TransportError>;

    /// Start sending media under `stream_key` over the open connection
    async fn publish(&self, stream_key: &str) -> Result<(), TransportError>;

    /// Close the connection
    async fn close(&self) -> Result<(), TransportError>;

    /// Bind the video source; `None` detaches it
    async fn attach_source(&self, handle: Option<DeviceHandle>) -> Result<(), TransportError>;

    /// Bind the audio input; `None` detaches it
    async fn attach_sink(&self, handle: Option<DeviceHandle>) -> Result<(), TransportError>;

    /// Live connected flag
    fn is_connected(&self) -> bool;
}

/// Hands out capture device handles from the execution environment
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Acquire a handle for the given device kind
    async fn acquire(&self, kind: DeviceKind) -> Result<DeviceHandle, DeviceError>;

    /// Process-level audio session setup (category, routing)
    async fn configure_audio_session(&self) -> Result<(), DeviceError>;
}

/// Answers capture permission requests
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn request_grant(&self, kind: DeviceKind) -> bool;
}

/// Request both grants concurrently
pub async fn request_grants(permissions: &dyn PermissionProvider) -> DeviceGrants {
    let (source, sink) = tokio::join!(
        permissions.request_grant(DeviceKind::Source),
        permissions.request_grant(DeviceKind::Sink),
    );
    DeviceGrants { source, sink }
}
