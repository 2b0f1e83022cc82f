//! Dispatch of inbound actions and connection departures.

use crate::connection::{Connection, ConnectionId};
use crate::error::RealtimeError;
use crate::event::ChatEvent;
use crate::presence::{IdentityBinding, PresenceRegistry};
use crate::protocol::Action;
use crate::topic::{BroadcastTopic, PublishTurn, Published};
use std::sync::Arc;
use tracing::{debug, info};

/// Default maximum username length, in characters.
pub const DEFAULT_MAX_USERNAME_LEN: usize = 30;

/// Default maximum chat message length, in characters.
pub const DEFAULT_MAX_CONTENT_LEN: usize = 4096;

/// Input limits applied by the router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum username length, in characters.
    pub max_username_len: usize,
    /// Maximum chat message length, in characters.
    pub max_content_len: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_username_len: DEFAULT_MAX_USERNAME_LEN,
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
        }
    }
}

/// Why a connection was declared dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepartureCause {
    /// The transport reported a close.
    Closed,
    /// A heartbeat probe went unanswered past its deadline.
    HeartbeatTimeout,
    /// A heartbeat probe could not be sent.
    ProbeFailed,
    /// The outbound queue was found closed during fan-out.
    DeliveryFailed,
}

impl std::fmt::Display for DepartureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepartureCause::Closed => write!(f, "closed"),
            DepartureCause::HeartbeatTimeout => write!(f, "heartbeat_timeout"),
            DepartureCause::ProbeFailed => write!(f, "probe_failed"),
            DepartureCause::DeliveryFailed => write!(f, "delivery_failed"),
        }
    }
}

/// Entry point for everything that changes presence or produces an event.
///
/// Each registry mutation happens inside the publish turn of the event it
/// causes, so the topic order always agrees with the registry history.
#[derive(Debug)]
pub struct MessageRouter {
    registry: Arc<PresenceRegistry>,
    topic: Arc<BroadcastTopic>,
    config: RouterConfig,
}

impl MessageRouter {
    /// Create a router over `registry` publishing to `topic`.
    pub fn new(
        registry: Arc<PresenceRegistry>,
        topic: Arc<BroadcastTopic>,
        config: RouterConfig,
    ) -> Self {
        Self {
            registry,
            topic,
            config,
        }
    }

    /// Handle one inbound action from `connection_id`.
    ///
    /// Returns the published event, or `None` when the action was a no-op
    /// (leaving without having joined).
    pub fn dispatch(
        &self,
        connection_id: &str,
        action: Action,
    ) -> Result<Option<Published>, RealtimeError> {
        let connection = self.live_connection(connection_id)?;

        let (published, closed) = match action {
            Action::Join { username } => {
                let (published, closed) = self.join(&connection, &username)?;
                (Some(published), closed)
            }
            Action::Chat { content } => {
                let (published, closed) = self.chat(&connection, content)?;
                (Some(published), closed)
            }
            Action::Leave => self.leave(&connection),
        };

        self.reap(closed);
        Ok(published)
    }

    /// Declare `connection_id` dead and remove it.
    ///
    /// Emits a leave if an identity was still bound. Only the first call for
    /// a connection has any effect, whatever its cause.
    pub fn depart(&self, connection_id: &str, cause: DepartureCause) -> Option<Published> {
        let (published, closed) = self.depart_one(connection_id, cause);
        self.reap(closed);
        published
    }

    fn live_connection(&self, connection_id: &str) -> Result<Arc<Connection>, RealtimeError> {
        match self.registry.get(connection_id) {
            Some(connection) if !connection.is_dead() => Ok(connection),
            _ => Err(RealtimeError::UnknownConnection(connection_id.to_string())),
        }
    }

    fn join(
        &self,
        connection: &Connection,
        username: &str,
    ) -> Result<(Published, Vec<ConnectionId>), RealtimeError> {
        if username.trim().chars().count() > self.config.max_username_len {
            return Err(RealtimeError::InvalidIdentity(format!(
                "username longer than {} characters",
                self.config.max_username_len
            )));
        }

        let turn = self.topic.begin();
        let binding = self.registry.bind(&connection.id, username)?;

        info!(
            connection_id = %connection.id,
            username = %binding.username,
            "User joined"
        );

        Ok(self.publish(turn, ChatEvent::join(binding.username)))
    }

    fn chat(
        &self,
        connection: &Connection,
        content: String,
    ) -> Result<(Published, Vec<ConnectionId>), RealtimeError> {
        if content.chars().count() > self.config.max_content_len {
            return Err(RealtimeError::ContentTooLong(self.config.max_content_len));
        }

        let turn = self.topic.begin();
        // A departure marks the connection dead before taking its turn, so
        // a death that won the race has already announced its leave.
        if connection.is_dead() {
            return Err(RealtimeError::UnknownConnection(connection.id.clone()));
        }
        let sender = self.registry.lookup(&connection.id);
        if sender.is_none() {
            debug!(connection_id = %connection.id, "Chat from connection without identity");
        }

        Ok(self.publish(turn, ChatEvent::chat(sender, content)))
    }

    fn leave(&self, connection: &Connection) -> (Option<Published>, Vec<ConnectionId>) {
        let turn = self.topic.begin();
        match self.registry.unbind(&connection.id) {
            Some(binding) => {
                let (published, closed) = self.announce_leave(turn, binding);
                (Some(published), closed)
            }
            None => {
                debug!(connection_id = %connection.id, "Leave without identity ignored");
                (None, Vec::new())
            }
        }
    }

    fn depart_one(
        &self,
        connection_id: &str,
        cause: DepartureCause,
    ) -> (Option<Published>, Vec<ConnectionId>) {
        let Some(connection) = self.registry.get(connection_id) else {
            return (None, Vec::new());
        };
        if !connection.mark_dead() {
            return (None, Vec::new());
        }

        let turn = self.topic.begin();
        let binding = self
            .registry
            .remove(connection_id)
            .and_then(|(_, binding)| binding);

        info!(connection_id = %connection_id, cause = %cause, "Connection removed");

        match binding {
            Some(binding) => {
                let (published, closed) = self.announce_leave(turn, binding);
                (Some(published), closed)
            }
            None => (None, Vec::new()),
        }
    }

    fn announce_leave(
        &self,
        turn: PublishTurn<'_>,
        binding: IdentityBinding,
    ) -> (Published, Vec<ConnectionId>) {
        info!(
            connection_id = %binding.connection_id,
            username = %binding.username,
            "User left"
        );
        self.publish(turn, ChatEvent::leave(binding.username))
    }

    fn publish(&self, turn: PublishTurn<'_>, event: ChatEvent) -> (Published, Vec<ConnectionId>) {
        let delivery = turn.publish(event.clone());
        let published = Published {
            sequence: delivery.sequence,
            event,
        };
        (published, delivery.closed)
    }

    /// Remove connections whose queues were found closed during fan-out.
    fn reap(&self, mut closed: Vec<ConnectionId>) {
        while let Some(connection_id) = closed.pop() {
            let (_, more) = self.depart_one(&connection_id, DepartureCause::DeliveryFailed);
            closed.extend(more);
        }
    }
}
