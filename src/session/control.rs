//! Control context
//!
//! A single task that performs every blocking or I/O-bound step of a session
//! in order: parse, configure, connect, device attach, publish, monitor
//! start/stop and teardown. It owns the device manager and the monitor and
//! reports outcomes to the state context as messages.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::{Collaborators, StateCommand};
use super::monitor::ConnectionMonitor;
use crate::config::SessionConfig;
use crate::device::DeviceManager;
use crate::error::TransportError;
use crate::target::{parse_target_with, ConnectionTarget};
use crate::transport::{request_grants, MediaTransport, PermissionProvider};

/// Initial attempt plus one retry
pub const PUBLISH_ATTEMPTS: u32 = 2;

/// Why a teardown was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TeardownReason {
    Stop,
    Reset,
    Destroy,
}

pub(crate) enum ControlCommand {
    Start {
        generation: u64,
        raw: String,
    },
    StartMonitor {
        generation: u64,
    },
    Teardown {
        generation: u64,
        reason: TeardownReason,
        done: Option<oneshot::Sender<()>>,
    },
}

pub(crate) struct ControlWorker {
    config: SessionConfig,
    transport: Arc<dyn MediaTransport>,
    permissions: Arc<dyn PermissionProvider>,
    devices: DeviceManager,
    monitor: ConnectionMonitor,
    state_tx: mpsc::UnboundedSender<StateCommand>,
    destroyed: Arc<AtomicBool>,
    /// Latest generation issued by the state context
    current: Arc<AtomicU64>,
}

impl ControlWorker {
    pub fn new(
        config: SessionConfig,
        collaborators: Collaborators,
        state_tx: mpsc::UnboundedSender<StateCommand>,
        destroyed: Arc<AtomicBool>,
        current: Arc<AtomicU64>,
        shutdown: CancellationToken,
    ) -> Self {
        let Collaborators {
            transport,
            devices,
            permissions,
        } = collaborators;

        Self {
            monitor: ConnectionMonitor::new(config.monitor.interval(), shutdown),
            devices: DeviceManager::new(transport.clone(), devices),
            config,
            transport,
            permissions,
            state_tx,
            destroyed,
            current,
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControlCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                ControlCommand::Start { generation, raw } => {
                    if self.is_destroyed() {
                        continue;
                    }
                    self.run_start(generation, &raw).await;
                }
                ControlCommand::StartMonitor { generation } => {
                    if self.is_superseded(generation) {
                        continue;
                    }
                    self.start_monitor(generation);
                }
                ControlCommand::Teardown {
                    generation,
                    reason,
                    done,
                } => {
                    self.teardown().await;
                    if reason != TeardownReason::Destroy {
                        self.report(StateCommand::TornDown { generation, reason });
                    }
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    if reason == TeardownReason::Destroy {
                        break;
                    }
                }
            }
        }
        debug!("Control context exited");
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// A later stop/reset (or destruction) took over; remaining steps are skipped
    fn is_superseded(&self, generation: u64) -> bool {
        self.is_destroyed() || self.current.load(Ordering::SeqCst) != generation
    }

    /// Hand a result to the state context; dropped silently once destroyed
    fn report(&self, command: StateCommand) {
        if self.is_destroyed() {
            return;
        }
        let _ = self.state_tx.send(command);
    }

    async fn run_start(&mut self, generation: u64, raw: &str) {
        if self.is_superseded(generation) {
            debug!("Skipping superseded start (generation {})", generation);
            return;
        }

        let target = match parse_target_with(raw, &self.config.target) {
            Ok(target) => target,
            Err(error) => {
                warn!("Rejected endpoint: {}", error);
                self.report(StateCommand::TargetRejected { generation, error });
                return;
            }
        };

        info!("Starting session to {}", target);

        // Leftovers from a failed attempt
        self.monitor.stop();
        if self.transport.is_connected() {
            if let Err(e) = self.transport.close().await {
                warn!("Closing stale connection failed: {}", e);
            }
        }

        if let Err(e) = self.transport.configure(&self.config.stream).await {
            warn!("Transport rejected stream settings: {}", e);
        }
        self.devices.configure_audio_session().await;

        // Permission prompts run alongside the connect; devices wait for both.
        let (connected, grants) = tokio::join!(
            self.transport.connect(&target),
            request_grants(self.permissions.as_ref()),
        );
        match &connected {
            Ok(()) => info!("Connected to {}", target),
            Err(e) => warn!("Connect to {} failed: {}", target, e),
        }

        if self.is_superseded(generation) {
            return;
        }

        for (kind, error) in self.devices.attach_granted(grants).await {
            self.report(StateCommand::DeviceUnavailable {
                generation,
                kind,
                reason: error.to_string(),
            });
        }

        if self.is_superseded(generation) {
            return;
        }

        let published = self.publish_with_retry(generation, &target, connected).await;
        if self.is_superseded(generation) {
            return;
        }
        match published {
            Ok(()) => {
                info!("Publishing to {}", target);
                self.report(StateCommand::Published { generation, target });
            }
            Err(error) => {
                warn!("Giving up on {} after {} attempts: {}", target, PUBLISH_ATTEMPTS, error);
                self.report(StateCommand::PublishFailed { generation, error });
            }
        }
    }

    /// Publish with a single retry after a fixed backoff
    ///
    /// The connect made alongside the permission requests counts as the first
    /// attempt's connect, so a start makes at most `PUBLISH_ATTEMPTS` connect
    /// calls and as many publish calls.
    async fn publish_with_retry(
        &self,
        generation: u64,
        target: &ConnectionTarget,
        connected: Result<(), TransportError>,
    ) -> Result<(), TransportError> {
        let backoff = self.config.retry.backoff();
        let mut last_error = TransportError::NotConnected;

        for attempt in 1..=PUBLISH_ATTEMPTS {
            if attempt > 1 {
                if self.is_superseded(generation) {
                    break;
                }
                info!(
                    "Retrying publish (attempt {}/{}) after {}ms",
                    attempt,
                    PUBLISH_ATTEMPTS,
                    backoff.as_millis()
                );
                tokio::time::sleep(backoff).await;
                if self.is_superseded(generation) {
                    break;
                }
            }

            let outcome = if attempt == 1 {
                match &connected {
                    Ok(()) => self.transport.publish(target.stream_key()).await,
                    Err(e) => Err(e.clone()),
                }
            } else {
                self.try_publish(target).await
            };

            match outcome {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Publish attempt {}/{} failed: {}", attempt, PUBLISH_ATTEMPTS, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    async fn try_publish(&self, target: &ConnectionTarget) -> Result<(), TransportError> {
        if !self.transport.is_connected() {
            self.transport.connect(target).await?;
        }
        self.transport.publish(target.stream_key()).await
    }

    fn start_monitor(&mut self, generation: u64) {
        let state_tx = self.state_tx.clone();
        let destroyed = self.destroyed.clone();
        let guard = self.destroyed.clone();

        self.monitor
            .start(self.transport.clone(), destroyed, move |health| {
                if guard.load(Ordering::SeqCst) {
                    return;
                }
                let _ = state_tx.send(StateCommand::Health { generation, health });
            });
    }

    /// Release everything the session holds; never fails
    async fn teardown(&mut self) {
        self.monitor.stop();
        self.devices.detach_all().await;
        if let Err(e) = self.transport.close().await {
            warn!("Closing transport failed: {}", e);
        }
        debug!("Teardown complete");
    }
}
