//! Heartbeat monitor: detects connections that went silent without closing.

use crate::connection::{ConnectionId, ProbeStep};
use crate::presence::PresenceRegistry;
use crate::protocol::Outbound;
use crate::router::{DepartureCause, MessageRouter};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default time between probe sweeps.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Default time a connection has to answer a probe.
pub const DEFAULT_REPLY_DEADLINE: Duration = Duration::from_secs(10);

/// Heartbeat timing.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Time between probe sweeps.
    pub probe_interval: Duration,
    /// Time a connection has to show any traffic after a probe.
    pub reply_deadline: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            probe_interval: DEFAULT_PROBE_INTERVAL,
            reply_deadline: DEFAULT_REPLY_DEADLINE,
        }
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Probes handed to connection queues.
    pub probed: usize,
    /// Connections whose probe deadline passed.
    pub expired: Vec<ConnectionId>,
    /// Connections whose probe could not be enqueued.
    pub probe_failed: Vec<ConnectionId>,
}

/// Probes every registered connection on a fixed interval.
///
/// Death is reported through [`MessageRouter::depart`], the same path a
/// transport close takes, so a connection produces at most one leave no
/// matter how many of them notice it is gone.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    registry: Arc<PresenceRegistry>,
    router: Arc<MessageRouter>,
    config: HeartbeatConfig,
}

impl HeartbeatMonitor {
    /// Create a monitor over `registry`.
    pub fn new(
        registry: Arc<PresenceRegistry>,
        router: Arc<MessageRouter>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            registry,
            router,
            config,
        }
    }

    /// Heartbeat timing in use.
    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Run one sweep at `now`.
    pub fn sweep(&self, now: Instant) -> SweepReport {
        let mut report = SweepReport::default();

        for connection in self.registry.connections() {
            match connection.check_probe(now, self.config.reply_deadline) {
                ProbeStep::Probe => match connection.enqueue(Outbound::Probe) {
                    Ok(()) => report.probed += 1,
                    Err(failure) => {
                        warn!(
                            connection_id = %connection.id,
                            failure = ?failure,
                            "Probe could not be sent"
                        );
                        self.router
                            .depart(&connection.id, DepartureCause::ProbeFailed);
                        report.probe_failed.push(connection.id.clone());
                    }
                },
                ProbeStep::Expired => {
                    info!(
                        connection_id = %connection.id,
                        idle_ms = connection.idle_for(now).as_millis() as u64,
                        "Heartbeat deadline missed"
                    );
                    self.router
                        .depart(&connection.id, DepartureCause::HeartbeatTimeout);
                    report.expired.push(connection.id.clone());
                }
                ProbeStep::Waiting | ProbeStep::Dead => {}
            }
        }

        if !report.expired.is_empty() || !report.probe_failed.is_empty() {
            debug!(
                probed = report.probed,
                expired = report.expired.len(),
                probe_failed = report.probe_failed.len(),
                "Heartbeat sweep"
            );
        }

        report
    }

    /// Run sweeps on the configured interval until `shutdown` is cancelled.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.probe_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                probe_interval_ms = self.config.probe_interval.as_millis() as u64,
                reply_deadline_ms = self.config.reply_deadline.as_millis() as u64,
                "Heartbeat monitor started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        self.sweep(Instant::now());
                    }
                }
            }

            info!("Heartbeat monitor stopped");
        })
    }
}
