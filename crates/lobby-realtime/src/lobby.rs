//! The lobby: transport-facing entry points wired to the core components.

use crate::connection::{create_connection, Connection, OutboundReceiver};
use crate::error::RealtimeError;
use crate::heartbeat::{HeartbeatConfig, HeartbeatMonitor};
use crate::presence::{PresenceEntry, PresenceRegistry};
use crate::protocol::{Action, ServerMessage};
use crate::router::{DepartureCause, MessageRouter, RouterConfig};
use crate::topic::{BroadcastTopic, Published, TopicStats};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default capacity of each connection's outbound queue.
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 256;

/// Default maximum number of concurrent connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10000;

/// Lobby configuration.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Heartbeat timing.
    pub heartbeat: HeartbeatConfig,
    /// Input limits.
    pub router: RouterConfig,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Maximum number of concurrent connections.
    pub max_connections: usize,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            heartbeat: HeartbeatConfig::default(),
            router: RouterConfig::default(),
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// A single presence-aware chat lobby.
///
/// The transport calls [`accept`](Lobby::accept) for each new link, feeds
/// frames to [`on_text_frame`](Lobby::on_text_frame) or
/// [`on_inbound_frame`](Lobby::on_inbound_frame), reports probe replies
/// with [`on_heartbeat_reply`](Lobby::on_heartbeat_reply) and closes with
/// [`on_connection_closed`](Lobby::on_connection_closed). It drains the
/// returned [`OutboundReceiver`] to write frames.
#[derive(Debug)]
pub struct Lobby {
    registry: Arc<PresenceRegistry>,
    topic: Arc<BroadcastTopic>,
    router: Arc<MessageRouter>,
    monitor: Arc<HeartbeatMonitor>,
    config: LobbyConfig,
}

impl Lobby {
    /// Create a lobby with the given configuration.
    pub fn new(config: LobbyConfig) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let topic = Arc::new(BroadcastTopic::new(registry.clone()));
        let router = Arc::new(MessageRouter::new(
            registry.clone(),
            topic.clone(),
            config.router.clone(),
        ));
        let monitor = Arc::new(HeartbeatMonitor::new(
            registry.clone(),
            router.clone(),
            config.heartbeat.clone(),
        ));

        Self {
            registry,
            topic,
            router,
            monitor,
            config,
        }
    }

    /// Register a newly accepted connection in the `Pending` state.
    pub fn accept(&self) -> Result<(Arc<Connection>, OutboundReceiver), RealtimeError> {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let (connection, receiver) =
            create_connection(connection_id.clone(), self.config.outbound_capacity);

        self.registry.register_bounded(connection.clone(), self.config.max_connections)?;
        self.topic.record_connection();

        info!(connection_id = %connection_id, "Connection accepted");

        Ok((connection, receiver))
    }

    /// Handle a parsed inbound action.
    ///
    /// Any frame counts as liveness traffic. A rejected action is reported
    /// to the sending connection only; the error is also returned.
    pub fn on_inbound_frame(
        &self,
        connection_id: &str,
        action: Action,
    ) -> Result<Option<Published>, RealtimeError> {
        let connection = self.touch(connection_id)?;
        let result = self.router.dispatch(connection_id, action);
        if let Err(err) = &result {
            Self::report(&connection, err);
        }
        result
    }

    /// Handle a raw JSON text frame.
    pub fn on_text_frame(
        &self,
        connection_id: &str,
        text: &str,
    ) -> Result<Option<Published>, RealtimeError> {
        let connection = self.touch(connection_id)?;
        let result =
            Action::parse(text).and_then(|action| self.router.dispatch(connection_id, action));
        if let Err(err) = &result {
            Self::report(&connection, err);
        }
        result
    }

    /// Record a reply to a heartbeat probe.
    pub fn on_heartbeat_reply(&self, connection_id: &str) {
        if self.touch(connection_id).is_ok() {
            debug!(connection_id = %connection_id, "Heartbeat reply");
        }
    }

    /// The transport closed the connection.
    ///
    /// Same path as a heartbeat timeout: emits a leave only if an identity is
    /// still bound, and only once.
    pub fn on_connection_closed(&self, connection_id: &str) -> Option<Published> {
        self.router.depart(connection_id, DepartureCause::Closed)
    }

    /// Snapshot of bound identities.
    pub fn presence(&self) -> Vec<PresenceEntry> {
        self.registry.all()
    }

    /// Current connection count.
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Topic statistics.
    pub fn stats(&self) -> TopicStats {
        self.topic.stats()
    }

    /// Listen to every published event, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.topic.subscribe()
    }

    /// Start the heartbeat monitor. It stops when `shutdown` is cancelled.
    pub fn spawn_heartbeat(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.monitor.clone().spawn(shutdown)
    }

    /// The heartbeat monitor, for driving sweeps by hand.
    pub fn monitor(&self) -> &Arc<HeartbeatMonitor> {
        &self.monitor
    }

    /// The presence registry.
    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    fn touch(&self, connection_id: &str) -> Result<Arc<Connection>, RealtimeError> {
        match self.registry.get(connection_id) {
            Some(connection) => {
                if connection.touch(Instant::now()) {
                    debug!(connection_id = %connection_id, "Connection alive");
                }
                Ok(connection)
            }
            None => {
                debug!(connection_id = %connection_id, "Frame from unknown connection dropped");
                Err(RealtimeError::UnknownConnection(connection_id.to_string()))
            }
        }
    }

    fn report(connection: &Connection, err: &RealtimeError) {
        if !err.is_reportable() {
            debug!(connection_id = %connection.id, error = %err, "Action dropped");
            return;
        }

        debug!(connection_id = %connection.id, error = %err, "Action rejected");
        // The connection may have died meanwhile; nothing else to do then.
        let _ = connection.reply(ServerMessage::error(err));
    }
}

impl Default for Lobby {
    fn default() -> Self {
        Self::new(LobbyConfig::default())
    }
}
