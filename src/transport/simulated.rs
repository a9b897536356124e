//! Scriptable in-process collaborators
//!
//! Used by the demo binary and the test suite. Failures, delays and
//! connection drops are injected through the setter methods; every call is
//! counted so callers can assert on exact interaction counts.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{DeviceProvider, MediaTransport, PermissionProvider};
use crate::config::StreamSettings;
use crate::device::{DeviceGrants, DeviceHandle, DeviceKind};
use crate::error::{DeviceError, TransportError};
use crate::target::ConnectionTarget;

/// Media transport that never touches the network
#[derive(Default)]
pub struct SimulatedTransport {
    connected: AtomicBool,
    connect_failures: AtomicU32,
    publish_failures: AtomicU32,
    close_fails: AtomicBool,
    detach_fails: AtomicBool,
    connect_delay: Mutex<Duration>,
    publish_delay: Mutex<Duration>,
    attach_failures: Mutex<HashSet<DeviceKind>>,
    source: Mutex<Option<DeviceHandle>>,
    sink: Mutex<Option<DeviceHandle>>,
    settings: Mutex<Option<StreamSettings>>,
    published_key: Mutex<Option<String>>,
    configure_calls: AtomicU32,
    connect_calls: AtomicU32,
    publish_calls: AtomicU32,
    close_calls: AtomicU32,
    attach_calls: AtomicU32,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` connect calls fail
    pub fn fail_next_connects(&self, n: u32) {
        self.connect_failures.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` publish calls fail
    pub fn fail_next_publishes(&self, n: u32) {
        self.publish_failures.store(n, Ordering::SeqCst);
    }

    /// Make `close` report an error (the connection is still dropped)
    pub fn fail_close(&self, fail: bool) {
        self.close_fails.store(fail, Ordering::SeqCst);
    }

    /// Make every detach report an error (the slot is still cleared)
    pub fn fail_detach(&self, fail: bool) {
        self.detach_fails.store(fail, Ordering::SeqCst);
    }

    /// Make attaching a device of this kind fail
    pub fn fail_attach(&self, kind: DeviceKind) {
        self.attach_failures.lock().insert(kind);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }

    pub fn set_publish_delay(&self, delay: Duration) {
        *self.publish_delay.lock() = delay;
    }

    /// Flip the connected flag, e.g. to simulate a network drop
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn source(&self) -> Option<DeviceHandle> {
        self.source.lock().clone()
    }

    pub fn sink(&self) -> Option<DeviceHandle> {
        self.sink.lock().clone()
    }

    pub fn settings(&self) -> Option<StreamSettings> {
        self.settings.lock().clone()
    }

    pub fn published_key(&self) -> Option<String> {
        self.published_key.lock().clone()
    }

    pub fn configure_calls(&self) -> u32 {
        self.configure_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn publish_calls(&self) -> u32 {
        self.publish_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Attach and detach calls for either kind
    pub fn attach_calls(&self) -> u32 {
        self.attach_calls.load(Ordering::SeqCst)
    }

    /// Total calls of any kind, including attach/detach
    pub fn total_calls(&self) -> u32 {
        self.configure_calls()
            + self.connect_calls()
            + self.publish_calls()
            + self.close_calls()
            + self.attach_calls()
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn attach(
        &self,
        kind: DeviceKind,
        slot: &Mutex<Option<DeviceHandle>>,
        handle: Option<DeviceHandle>,
    ) -> Result<(), TransportError> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        let Some(handle) = handle else {
            *slot.lock() = None;
            if self.detach_fails.load(Ordering::SeqCst) {
                return Err(TransportError::Attach {
                    kind,
                    reason: "simulated detach failure".to_string(),
                });
            }
            return Ok(());
        };

        if self.attach_failures.lock().contains(&kind) {
            return Err(TransportError::Attach {
                kind,
                reason: "simulated attach failure".to_string(),
            });
        }
        *slot.lock() = Some(handle);
        Ok(())
    }
}

#[async_trait]
impl MediaTransport for SimulatedTransport {
    async fn configure(&self, settings: &StreamSettings) -> Result<(), TransportError> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        *self.settings.lock() = Some(settings.clone());
        Ok(())
    }

    async fn connect(&self, target: &ConnectionTarget) -> Result<(), TransportError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if Self::take_failure(&self.connect_failures) {
            debug!("Simulated connect to {} failed", target);
            return Err(TransportError::Connect {
                target: target.to_string(),
                reason: "simulated connect failure".to_string(),
            });
        }

        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, stream_key: &str) -> Result<(), TransportError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.publish_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if Self::take_failure(&self.publish_failures) {
            return Err(TransportError::Publish("simulated publish rejection".to_string()));
        }

        *self.published_key.lock() = Some(stream_key.to_string());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        *self.published_key.lock() = None;

        if self.close_fails.load(Ordering::SeqCst) {
            return Err(TransportError::Close("simulated close failure".to_string()));
        }
        Ok(())
    }

    async fn attach_source(&self, handle: Option<DeviceHandle>) -> Result<(), TransportError> {
        self.attach(DeviceKind::Source, &self.source, handle)
    }

    async fn attach_sink(&self, handle: Option<DeviceHandle>) -> Result<(), TransportError> {
        self.attach(DeviceKind::Sink, &self.sink, handle)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Device provider backed by numbered fake handles
#[derive(Default)]
pub struct SimulatedDevices {
    unavailable: Mutex<HashSet<DeviceKind>>,
    issued: AtomicU32,
    audio_session_calls: AtomicU32,
}

impl SimulatedDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make acquiring this kind fail
    pub fn set_unavailable(&self, kind: DeviceKind) {
        self.unavailable.lock().insert(kind);
    }

    pub fn issued(&self) -> u32 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn audio_session_calls(&self) -> u32 {
        self.audio_session_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceProvider for SimulatedDevices {
    async fn acquire(&self, kind: DeviceKind) -> Result<DeviceHandle, DeviceError> {
        if self.unavailable.lock().contains(&kind) {
            return Err(DeviceError::Unavailable {
                kind,
                reason: "simulated device missing".to_string(),
            });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        let name = match kind {
            DeviceKind::Source => "sim-camera",
            DeviceKind::Sink => "sim-microphone",
        };
        Ok(DeviceHandle::new(format!("{}-{}", name, n)))
    }

    async fn configure_audio_session(&self) -> Result<(), DeviceError> {
        self.audio_session_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Permission provider with fixed answers
pub struct SimulatedPermissions {
    grants: DeviceGrants,
    delay: Mutex<Duration>,
    requests: AtomicU32,
}

impl SimulatedPermissions {
    pub fn new(grants: DeviceGrants) -> Self {
        Self {
            grants,
            delay: Mutex::new(Duration::ZERO),
            requests: AtomicU32::new(0),
        }
    }

    pub fn granting_all() -> Self {
        Self::new(DeviceGrants::all())
    }

    /// Delay every answer, e.g. to model a pending prompt
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedPermissions {
    fn default() -> Self {
        Self::granting_all()
    }
}

#[async_trait]
impl PermissionProvider for SimulatedPermissions {
    async fn request_grant(&self, kind: DeviceKind) -> bool {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.grants.is_granted(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::parse_target;
    use crate::transport::request_grants;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_publish_requires_connection() {
        let transport = SimulatedTransport::new();
        assert_eq!(
            transport.publish("key").await,
            Err(TransportError::NotConnected)
        );

        let target = parse_target("rtmp://sim/app/key").unwrap();
        assert_ok!(transport.connect(&target).await);
        assert_ok!(transport.publish("key").await);
        assert_eq!(transport.published_key().as_deref(), Some("key"));
        assert_eq!(transport.publish_calls(), 2);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let transport = SimulatedTransport::new();
        let target = parse_target("rtmp://sim/app/key").unwrap();
        transport.fail_next_connects(1);

        assert_err!(transport.connect(&target).await);
        assert!(!transport.is_connected());
        assert_ok!(transport.connect(&target).await);
        assert!(transport.is_connected());
    }

    #[tokio::test]
    async fn test_close_drops_connection_even_on_error() {
        let transport = SimulatedTransport::new();
        transport.set_connected(true);
        transport.fail_close(true);

        assert_err!(transport.close().await);
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_devices_issue_distinct_handles() {
        let devices = SimulatedDevices::new();
        let a = assert_ok!(devices.acquire(DeviceKind::Source).await);
        let b = assert_ok!(devices.acquire(DeviceKind::Source).await);
        assert_ne!(a, b);

        devices.set_unavailable(DeviceKind::Sink);
        assert_err!(devices.acquire(DeviceKind::Sink).await);
    }

    #[tokio::test]
    async fn test_request_grants_asks_once_per_kind() {
        let permissions = SimulatedPermissions::new(DeviceGrants {
            source: true,
            sink: false,
        });
        let grants = request_grants(&permissions).await;
        assert!(grants.source);
        assert!(!grants.sink);
        assert_eq!(permissions.requests(), 2);
    }
}
