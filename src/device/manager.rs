//! Device resource manager
//!
//! Keeps at most one binding per [`DeviceKind`] on the media transport.
//! Lives on the control context, so every method takes `&mut self` and no
//! locking is needed.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{DeviceBinding, DeviceGrants, DeviceHandle, DeviceKind};
use crate::error::DeviceError;
use crate::transport::{DeviceProvider, MediaTransport};

pub struct DeviceManager {
    transport: Arc<dyn MediaTransport>,
    provider: Arc<dyn DeviceProvider>,
    bindings: HashMap<DeviceKind, DeviceBinding>,
}

impl DeviceManager {
    pub fn new(transport: Arc<dyn MediaTransport>, provider: Arc<dyn DeviceProvider>) -> Self {
        Self {
            transport,
            provider,
            bindings: HashMap::new(),
        }
    }

    /// Current binding for a kind, if any
    pub fn binding(&self, kind: DeviceKind) -> Option<&DeviceBinding> {
        self.bindings.get(&kind)
    }

    /// Number of active bindings
    pub fn active_count(&self) -> usize {
        self.bindings.values().filter(|b| b.attached).count()
    }

    /// Forward the process-level audio session setup; failures are logged only
    pub async fn configure_audio_session(&self) {
        if let Err(e) = self.provider.configure_audio_session().await {
            warn!("Audio session configuration failed: {}", e);
        }
    }

    /// Bind a fresh device of `kind`, replacing any existing binding
    ///
    /// Errors are logged and returned; the caller decides whether to carry on.
    pub async fn attach(&mut self, kind: DeviceKind) -> Result<(), DeviceError> {
        self.detach(kind).await;

        let handle = self.provider.acquire(kind).await.map_err(|e| {
            warn!("Could not acquire {} device: {}", kind, e);
            e
        })?;

        if let Err(e) = self.set_on_transport(kind, Some(handle.clone())).await {
            warn!("Could not attach {} device {}: {}", kind, handle, e);
            return Err(e.into());
        }

        info!("Attached {} device {}", kind, handle);
        self.bindings.insert(
            kind,
            DeviceBinding {
                kind,
                handle,
                attached: true,
            },
        );
        Ok(())
    }

    /// Attach every granted kind; returns the kinds that could not be bound
    pub async fn attach_granted(&mut self, grants: DeviceGrants) -> Vec<(DeviceKind, DeviceError)> {
        let mut failures = Vec::new();
        for kind in DeviceKind::ALL {
            if !grants.is_granted(kind) {
                warn!("Permission for {} denied, publishing without it", kind);
                failures.push((kind, DeviceError::PermissionDenied(kind)));
                continue;
            }
            if let Err(e) = self.attach(kind).await {
                failures.push((kind, e));
            }
        }
        failures
    }

    /// Remove the binding for `kind`; no-op if nothing is bound
    pub async fn detach(&mut self, kind: DeviceKind) {
        let Some(binding) = self.bindings.remove(&kind) else {
            return;
        };

        // The binding is gone either way; a failed detach only gets logged.
        match self.set_on_transport(kind, None).await {
            Ok(()) => debug!("Detached {} device {}", kind, binding.handle),
            Err(e) => warn!("Detaching {} device {} failed: {}", kind, binding.handle, e),
        }
    }

    /// Remove every binding
    pub async fn detach_all(&mut self) {
        for kind in DeviceKind::ALL {
            self.detach(kind).await;
        }
    }

    async fn set_on_transport(
        &self,
        kind: DeviceKind,
        handle: Option<DeviceHandle>,
    ) -> Result<(), crate::error::TransportError> {
        match kind {
            DeviceKind::Source => self.transport.attach_source(handle).await,
            DeviceKind::Sink => self.transport.attach_sink(handle).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::simulated::{SimulatedDevices, SimulatedTransport};

    fn manager() -> (DeviceManager, Arc<SimulatedTransport>, Arc<SimulatedDevices>) {
        let transport = Arc::new(SimulatedTransport::new());
        let devices = Arc::new(SimulatedDevices::new());
        (
            DeviceManager::new(transport.clone(), devices.clone()),
            transport,
            devices,
        )
    }

    #[tokio::test]
    async fn test_attach_binds_on_transport() {
        let (mut manager, transport, _) = manager();

        manager.attach(DeviceKind::Source).await.unwrap();
        let binding = manager.binding(DeviceKind::Source).unwrap();
        assert!(binding.attached);
        assert_eq!(transport.source().as_ref(), Some(&binding.handle));
        assert!(transport.sink().is_none());
    }

    #[tokio::test]
    async fn test_reattach_replaces_binding() {
        let (mut manager, transport, devices) = manager();

        manager.attach(DeviceKind::Sink).await.unwrap();
        let first = manager.binding(DeviceKind::Sink).unwrap().handle.clone();
        manager.attach(DeviceKind::Sink).await.unwrap();
        let second = manager.binding(DeviceKind::Sink).unwrap().handle.clone();

        assert_ne!(first, second);
        assert_eq!(transport.sink(), Some(second));
        assert_eq!(manager.active_count(), 1);
        assert_eq!(devices.issued(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_device_is_not_bound() {
        let (mut manager, transport, devices) = manager();
        devices.set_unavailable(DeviceKind::Source);

        let err = manager.attach(DeviceKind::Source).await.unwrap_err();
        assert!(matches!(err, DeviceError::Unavailable { .. }));
        assert!(manager.binding(DeviceKind::Source).is_none());
        assert!(transport.source().is_none());
    }

    #[tokio::test]
    async fn test_transport_attach_failure_is_not_bound() {
        let (mut manager, transport, _) = manager();
        transport.fail_attach(DeviceKind::Sink);

        let err = manager.attach(DeviceKind::Sink).await.unwrap_err();
        assert!(matches!(err, DeviceError::Transport(_)));
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_attach_granted_skips_denied_kinds() {
        let (mut manager, transport, _) = manager();

        let failures = manager
            .attach_granted(DeviceGrants {
                source: true,
                sink: false,
            })
            .await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, DeviceKind::Sink);
        assert_eq!(failures[0].1, DeviceError::PermissionDenied(DeviceKind::Sink));
        assert!(transport.source().is_some());
        assert!(transport.sink().is_none());
    }

    #[tokio::test]
    async fn test_detach_all_clears_everything() {
        let (mut manager, transport, _) = manager();
        manager.attach_granted(DeviceGrants::all()).await;
        assert_eq!(manager.active_count(), 2);

        manager.detach_all().await;
        assert_eq!(manager.active_count(), 0);
        assert!(transport.source().is_none());
        assert!(transport.sink().is_none());
    }

    #[tokio::test]
    async fn test_detach_all_on_empty_is_noop() {
        let (mut manager, transport, _) = manager();
        manager.detach_all().await;
        manager.detach_all().await;
        assert_eq!(transport.attach_calls(), 0);
    }
}
