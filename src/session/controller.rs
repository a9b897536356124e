//! Session controller
//!
//! Public handle plus the state context. The handle never touches state
//! directly: `start`, `stop` and `reset` are fire-and-forget messages to the
//! state actor, which owns [`SessionState`], the status surface and the
//! generation counter, and dispatches I/O work to the control context.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::control::{ControlCommand, ControlWorker, TeardownReason};
use super::monitor::ConnectionHealth;
use super::state::SessionState;
use super::status::{status_text, SessionStatus, StatusSurface};
use crate::config::SessionConfig;
use crate::device::DeviceKind;
use crate::error::{AppError, ParseError, Result, TransportError};
use crate::events::{EventBus, SessionEvent};
use crate::target::ConnectionTarget;
use crate::transport::{DeviceProvider, MediaTransport, PermissionProvider};
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// External capabilities the controller drives
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn MediaTransport>,
    pub devices: Arc<dyn DeviceProvider>,
    pub permissions: Arc<dyn PermissionProvider>,
}

/// Messages handled by the state context
pub(crate) enum StateCommand {
    Start {
        raw: String,
    },
    Stop,
    Reset,
    Query {
        reply: oneshot::Sender<SessionState>,
    },
    TargetRejected {
        generation: u64,
        error: ParseError,
    },
    DeviceUnavailable {
        generation: u64,
        kind: DeviceKind,
        reason: String,
    },
    Published {
        generation: u64,
        target: ConnectionTarget,
    },
    PublishFailed {
        generation: u64,
        error: TransportError,
    },
    Health {
        generation: u64,
        health: ConnectionHealth,
    },
    TornDown {
        generation: u64,
        reason: TeardownReason,
    },
}

/// Owner of the session state; runs on its own task
struct StateActor {
    state: SessionState,
    /// Bumped on every accepted start/stop/reset; stale completions are dropped
    generation: u64,
    /// Mirror of `generation` read by the control context between steps
    current: Arc<AtomicU64>,
    /// Target of the session currently in `Monitoring`
    target: Option<ConnectionTarget>,
    connection_lost: bool,
    status: StatusSurface,
    events: Arc<EventBus>,
    control: mpsc::UnboundedSender<ControlCommand>,
    destroyed: Arc<AtomicBool>,
    throttler: LogThrottler,
}

impl StateActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<StateCommand>) {
        while let Some(command) = rx.recv().await {
            if let StateCommand::Query { reply } = command {
                let _ = reply.send(self.state);
                continue;
            }
            if self.destroyed.load(Ordering::SeqCst) {
                continue;
            }
            self.handle(command);
        }
        debug!("State context exited");
    }

    fn handle(&mut self, command: StateCommand) {
        match command {
            StateCommand::Start { raw } => self.on_start(raw),
            StateCommand::Stop => self.on_stop(),
            StateCommand::Reset => self.on_reset(),
            StateCommand::Query { .. } => {}
            StateCommand::TargetRejected { generation, error } => {
                if self.is_current(generation, "target rejection") {
                    self.fail(status_text::INVALID_TARGET, error.to_string());
                }
            }
            StateCommand::DeviceUnavailable {
                generation,
                kind,
                reason,
            } => {
                if self.is_current(generation, "device report") {
                    self.events
                        .publish(SessionEvent::DeviceUnavailable { kind, reason });
                }
            }
            StateCommand::Published { generation, target } => {
                if self.is_current(generation, "publish acknowledgment") {
                    self.on_published(generation, target);
                }
            }
            StateCommand::PublishFailed { generation, error } => {
                if self.is_current(generation, "publish failure") {
                    self.fail(status_text::CONNECTION_FAILED, error.to_string());
                }
            }
            StateCommand::Health { generation, health } => {
                if self.is_current(generation, "health report")
                    && self.state == SessionState::Monitoring
                {
                    self.on_health(health);
                }
            }
            StateCommand::TornDown { generation, reason } => {
                if self.is_current(generation, "teardown completion") {
                    self.on_torn_down(reason);
                }
            }
        }
    }

    fn is_current(&self, generation: u64, what: &str) -> bool {
        if generation != self.generation {
            debug!(
                "Discarding stale {} (generation {}, current {})",
                what, generation, self.generation
            );
            return false;
        }
        true
    }

    fn transition(&mut self, next: SessionState) -> bool {
        let from = self.state;
        if !from.can_transition_to(next) {
            warn!("Rejected state transition {} -> {}", from, next);
            return false;
        }
        self.state = next;
        self.status.set_state(next);
        self.events
            .publish(SessionEvent::StateChanged { from, to: next });
        debug!("Session state {} -> {}", from, next);
        true
    }

    fn set_text(&self, text: &str) {
        self.status.set_text(text);
        self.events.publish(SessionEvent::StatusChanged {
            text: text.to_string(),
            is_publishing: self.state.is_publishing(),
        });
    }

    fn on_start(&mut self, raw: String) {
        if !self.state.can_start() {
            debug!("Ignoring start while {}", self.state);
            self.events
                .publish(SessionEvent::StartIgnored { state: self.state });
            return;
        }

        self.bump_generation();
        self.target = None;
        self.connection_lost = false;
        self.transition(SessionState::Connecting);
        self.set_text(status_text::STARTING);

        let _ = self.control.send(ControlCommand::Start {
            generation: self.generation,
            raw,
        });
    }

    fn bump_generation(&mut self) {
        self.generation += 1;
        self.current.store(self.generation, Ordering::SeqCst);
    }

    fn on_stop(&mut self) {
        if matches!(self.state, SessionState::Idle | SessionState::Stopping) {
            debug!("Ignoring stop while {}", self.state);
            return;
        }
        info!("Stopping session");
        self.begin_teardown(TeardownReason::Stop);
    }

    fn on_reset(&mut self) {
        info!("Resetting session from {}", self.state);
        self.begin_teardown(TeardownReason::Reset);
    }

    fn begin_teardown(&mut self, reason: TeardownReason) {
        self.bump_generation();
        self.transition(SessionState::Stopping);
        self.set_text(status_text::STOPPING);

        let _ = self.control.send(ControlCommand::Teardown {
            generation: self.generation,
            reason,
            done: None,
        });
    }

    fn on_published(&mut self, generation: u64, target: ConnectionTarget) {
        if !self.transition(SessionState::Publishing) || !self.transition(SessionState::Monitoring) {
            return;
        }
        info!("Streaming to {}", target);
        self.target = Some(target);
        self.set_text(status_text::STREAMING);

        let _ = self.control.send(ControlCommand::StartMonitor { generation });
    }

    fn on_health(&mut self, health: ConnectionHealth) {
        let target = self
            .target
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        match health {
            ConnectionHealth::Connected => {
                if self.connection_lost {
                    info!("Connection to {} is back", target);
                    self.connection_lost = false;
                    self.throttler.clear("connection_lost");
                    self.events
                        .publish(SessionEvent::ConnectionRestored { target });
                }
                self.set_text(status_text::STREAMING);
            }
            ConnectionHealth::Connecting => self.set_text(status_text::CONNECTING),
            ConnectionHealth::Lost => {
                warn_throttled!(
                    self.throttler,
                    "connection_lost",
                    "Connection to {} lost; waiting for stop or reset",
                    target
                );
                if !self.connection_lost {
                    self.connection_lost = true;
                    self.events.publish(SessionEvent::ConnectionLost { target });
                }
                self.set_text(status_text::CONNECTION_LOST);
            }
        }
    }

    fn on_torn_down(&mut self, reason: TeardownReason) {
        self.target = None;
        self.connection_lost = false;
        self.transition(SessionState::Idle);
        let text = match reason {
            TeardownReason::Stop => status_text::STOPPED,
            TeardownReason::Reset | TeardownReason::Destroy => status_text::READY,
        };
        self.set_text(text);
        info!("Session {}", text);
    }

    fn fail(&mut self, text: &str, reason: String) {
        if self.transition(SessionState::Failed) {
            self.set_text(text);
            self.events.publish(SessionEvent::SessionFailed { reason });
        }
    }
}

/// Handle to one publishing session
///
/// Commands never block and never return errors; outcomes are visible only
/// through [`status`](Self::status), the status watch channel and the event
/// bus. Must be created inside a tokio runtime.
///
/// Dropping the handle sets the destroyed flag, cancels the monitor and
/// queues a teardown; use [`shutdown`](Self::shutdown) to wait for it.
/// Status receivers that outlive the handle keep the last snapshot, which may
/// still read "connected and streaming"; the teardown itself is never
/// published to them.
pub struct SessionController {
    commands: mpsc::UnboundedSender<StateCommand>,
    control: mpsc::UnboundedSender<ControlCommand>,
    status: watch::Receiver<SessionStatus>,
    events: Arc<EventBus>,
    destroyed: Arc<AtomicBool>,
    shutdown: CancellationToken,
}

impl SessionController {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        let (state_tx, state_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let destroyed = Arc::new(AtomicBool::new(false));
        let current = Arc::new(AtomicU64::new(0));
        let shutdown = CancellationToken::new();
        let events = Arc::new(EventBus::new());
        let status = StatusSurface::new();
        let status_rx = status.subscribe();

        let actor = StateActor {
            state: SessionState::Idle,
            generation: 0,
            current: current.clone(),
            target: None,
            connection_lost: false,
            status,
            events: events.clone(),
            control: control_tx.clone(),
            destroyed: destroyed.clone(),
            throttler: LogThrottler::with_secs(config.monitor.log_throttle_secs),
        };
        let worker = ControlWorker::new(
            config,
            collaborators,
            state_tx.clone(),
            destroyed.clone(),
            current,
            shutdown.clone(),
        );

        tokio::spawn(actor.run(state_rx));
        tokio::spawn(worker.run(control_rx));

        Self {
            commands: state_tx,
            control: control_tx,
            status: status_rx,
            events,
            destroyed,
            shutdown,
        }
    }

    /// Begin a session to `raw_target`; ignored unless idle or failed
    pub fn start(&self, raw_target: impl Into<String>) {
        self.send(StateCommand::Start {
            raw: raw_target.into(),
        });
    }

    /// Tear the session down; ignored when idle
    pub fn stop(&self) {
        self.send(StateCommand::Stop);
    }

    /// Forced teardown back to `Idle` from any state
    pub fn reset(&self) {
        self.send(StateCommand::Reset);
    }

    /// Current state as seen by the state context
    ///
    /// Ordered after every command sent before it from this handle.
    pub async fn state(&self) -> Result<SessionState> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(StateCommand::Query { reply })
            .map_err(|_| AppError::ControllerGone)?;
        rx.await.map_err(|_| AppError::ControllerGone)
    }

    /// Latest published status
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn is_publishing(&self) -> bool {
        self.status.borrow().is_publishing
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Mark destroyed, then run the reset teardown and wait for it
    pub async fn shutdown(self) {
        if let Some(done) = self.destroy() {
            let _ = done.await;
        }
    }

    fn send(&self, command: StateCommand) {
        if self.destroyed.load(Ordering::SeqCst) {
            return;
        }
        if self.commands.send(command).is_err() {
            warn!("Session state context is gone");
        }
    }

    /// Set the destroyed flag exactly once and queue the final teardown
    fn destroy(&self) -> Option<oneshot::Receiver<()>> {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return None;
        }
        self.shutdown.cancel();

        let (done, rx) = oneshot::channel();
        let queued = self.control.send(ControlCommand::Teardown {
            generation: 0,
            reason: TeardownReason::Destroy,
            done: Some(done),
        });
        queued.ok().map(|_| rx)
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let _ = self.destroy();
    }
}
