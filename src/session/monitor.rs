//! Connection monitor
//!
//! Periodically samples the transport's connected flag while the session is
//! in `Monitoring`. It only reports; it never reconnects, so it cannot race a
//! user-initiated stop or start.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::transport::MediaTransport;

/// Result of one monitor tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// Connected flag is set
    Connected,
    /// Not connected yet, and never was during this monitoring window
    Connecting,
    /// Was connected, now is not
    Lost,
}

/// Turns raw connected samples into health reports
#[derive(Debug, Default)]
pub(crate) struct HealthSampler {
    ever_connected: bool,
}

impl HealthSampler {
    pub fn sample(&mut self, connected: bool) -> ConnectionHealth {
        if connected {
            self.ever_connected = true;
            ConnectionHealth::Connected
        } else if self.ever_connected {
            ConnectionHealth::Lost
        } else {
            ConnectionHealth::Connecting
        }
    }
}

struct ActiveMonitor {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owner of the (at most one) monitor task
pub(crate) struct ConnectionMonitor {
    interval: Duration,
    /// Cancelling the parent stops any running monitor, even from `Drop`
    parent: CancellationToken,
    active: Option<ActiveMonitor>,
}

impl ConnectionMonitor {
    pub fn new(interval: Duration, parent: CancellationToken) -> Self {
        Self {
            interval,
            parent,
            active: None,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    /// Start sampling; any monitor already running is cancelled first
    ///
    /// The first tick fires immediately.
    pub fn start<F>(&mut self, transport: Arc<dyn MediaTransport>, destroyed: Arc<AtomicBool>, report: F)
    where
        F: Fn(ConnectionHealth) + Send + 'static,
    {
        self.stop();

        let token = self.parent.child_token();
        let task_token = token.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sampler = HealthSampler::default();

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if destroyed.load(Ordering::SeqCst) {
                            break;
                        }
                        let health = sampler.sample(transport.is_connected());
                        trace!("Connection monitor tick: {:?}", health);
                        report(health);
                    }
                }
            }
            debug!("Connection monitor exited");
        });

        debug!("Connection monitor started ({}ms period)", interval.as_millis());
        self.active = Some(ActiveMonitor { token, handle });
    }

    /// Cancel the running monitor, if any; takes effect before the next tick
    pub fn stop(&mut self) {
        if let Some(active) = self.active.take() {
            active.token.cancel();
            active.handle.abort();
            debug!("Connection monitor stopped");
        }
    }
}

impl Drop for ConnectionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::simulated::SimulatedTransport;
    use tokio::sync::mpsc;

    #[test]
    fn test_sampler_sequence() {
        let mut sampler = HealthSampler::default();
        assert_eq!(sampler.sample(false), ConnectionHealth::Connecting);
        assert_eq!(sampler.sample(true), ConnectionHealth::Connected);
        assert_eq!(sampler.sample(false), ConnectionHealth::Lost);
        assert_eq!(sampler.sample(false), ConnectionHealth::Lost);
        assert_eq!(sampler.sample(true), ConnectionHealth::Connected);
    }

    fn spawn_monitor(
        transport: Arc<SimulatedTransport>,
        parent: CancellationToken,
    ) -> (ConnectionMonitor, mpsc::UnboundedReceiver<ConnectionHealth>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut monitor = ConnectionMonitor::new(Duration::from_secs(5), parent);
        monitor.start(transport, Arc::new(AtomicBool::new(false)), move |health| {
            let _ = tx.send(health);
        });
        (monitor, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_each_tick() {
        let transport = Arc::new(SimulatedTransport::new());
        transport.set_connected(true);
        let (monitor, mut rx) = spawn_monitor(transport.clone(), CancellationToken::new());

        assert_eq!(rx.recv().await, Some(ConnectionHealth::Connected));
        transport.set_connected(false);
        assert_eq!(rx.recv().await, Some(ConnectionHealth::Lost));
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_cancels_previous() {
        let transport = Arc::new(SimulatedTransport::new());
        let (mut monitor, mut first_rx) = spawn_monitor(transport.clone(), CancellationToken::new());
        assert_eq!(first_rx.recv().await, Some(ConnectionHealth::Connecting));

        let (tx, mut second_rx) = mpsc::unbounded_channel();
        monitor.start(transport, Arc::new(AtomicBool::new(false)), move |health| {
            let _ = tx.send(health);
        });

        // The first task's sender is dropped once it is cancelled
        assert_eq!(first_rx.recv().await, None);
        assert!(second_rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_stops_monitor() {
        let transport = Arc::new(SimulatedTransport::new());
        let parent = CancellationToken::new();
        let (_monitor, mut rx) = spawn_monitor(transport, parent.clone());
        assert!(rx.recv().await.is_some());

        parent.cancel();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent() {
        let transport = Arc::new(SimulatedTransport::new());
        let (mut monitor, mut rx) = spawn_monitor(transport, CancellationToken::new());
        assert!(rx.recv().await.is_some());

        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(rx.recv().await, None);
    }
}
