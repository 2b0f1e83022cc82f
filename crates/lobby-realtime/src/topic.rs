//! The public topic: one total order of events, fanned out to every connection.

use crate::connection::{ConnectionId, DeliveryFailure};
use crate::event::ChatEvent;
use crate::presence::PresenceRegistry;
use crate::protocol::Outbound;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Capacity of the observer channel.
const OBSERVER_CAPACITY: usize = 1024;

/// An event together with its position in the topic's order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Topic-wide sequence number, starting at 1.
    pub sequence: u64,
    /// The event.
    pub event: ChatEvent,
}

/// Result of one fan-out.
#[derive(Debug, Clone, Default)]
pub struct Delivery {
    /// Sequence number assigned to the event.
    pub sequence: u64,
    /// Recipients whose queue accepted the event.
    pub delivered: usize,
    /// Recipients whose queue was full; the event was dropped for them.
    pub dropped: Vec<ConnectionId>,
    /// Recipients whose queue is gone. Treated as dead by the router.
    pub closed: Vec<ConnectionId>,
}

/// Fan-out point for the single public topic.
///
/// Publishing is serialized by a sequencing lock so every recipient sees the
/// same global order. Delivery itself is a non-blocking hand-off per
/// recipient, so a stalled client only loses its own copy.
#[derive(Debug)]
pub struct BroadcastTopic {
    /// Where recipients come from.
    registry: Arc<PresenceRegistry>,
    /// Last assigned sequence number. Held for the whole publish turn.
    sequence: Mutex<u64>,
    /// Observer channel for in-process listeners.
    observer_tx: broadcast::Sender<Published>,
    /// Statistics.
    stats: RwLock<TopicStats>,
}

impl BroadcastTopic {
    /// Create a topic delivering to the connections in `registry`.
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        let (observer_tx, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            registry,
            sequence: Mutex::new(0),
            observer_tx,
            stats: RwLock::new(TopicStats::default()),
        }
    }

    /// Take the next slot in the topic's order.
    ///
    /// Registry changes made while the turn is held are ordered with the
    /// event published through it.
    pub fn begin(&self) -> PublishTurn<'_> {
        PublishTurn {
            topic: self,
            sequence: self.sequence.lock(),
        }
    }

    /// Publish one event to every registered connection.
    pub fn publish(&self, event: ChatEvent) -> Delivery {
        self.begin().publish(event)
    }

    /// Listen to every published event, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.observer_tx.subscribe()
    }

    /// Count an accepted connection.
    pub fn record_connection(&self) {
        self.stats.write().total_connections += 1;
    }

    /// Get topic statistics.
    pub fn stats(&self) -> TopicStats {
        let mut stats = self.stats.read().clone();
        stats.current_connections = self.registry.connection_count();
        stats.bound_identities = self.registry.binding_count();
        stats
    }

    fn fan_out(&self, sequence: u64, event: ChatEvent) -> Delivery {
        let mut delivery = Delivery {
            sequence,
            ..Delivery::default()
        };

        for connection in self.registry.connections() {
            let item = Outbound::Event {
                sequence,
                event: event.clone(),
            };
            match connection.enqueue(item) {
                Ok(()) => delivery.delivered += 1,
                Err(DeliveryFailure::QueueFull) => {
                    warn!(
                        connection_id = %connection.id,
                        sequence,
                        "Outbound queue full, event dropped"
                    );
                    delivery.dropped.push(connection.id.clone());
                }
                Err(DeliveryFailure::Closed) => {
                    delivery.closed.push(connection.id.clone());
                }
            }
        }

        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            stats.dropped_deliveries += delivery.dropped.len() as u64;
        }

        debug!(
            sequence,
            kind = %event.kind,
            recipients = delivery.delivered,
            dropped = delivery.dropped.len(),
            closed = delivery.closed.len(),
            "Event broadcast"
        );

        // No observers is fine.
        let _ = self.observer_tx.send(Published { sequence, event });

        delivery
    }
}

/// Exclusive slot in the topic's order.
///
/// Dropping a turn without publishing releases the slot without consuming a
/// sequence number.
pub struct PublishTurn<'a> {
    topic: &'a BroadcastTopic,
    sequence: MutexGuard<'a, u64>,
}

impl PublishTurn<'_> {
    /// Publish `event` and release the turn.
    pub fn publish(mut self, event: ChatEvent) -> Delivery {
        *self.sequence += 1;
        let sequence = *self.sequence;
        self.topic.fan_out(sequence, event)
    }
}

/// Topic statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopicStats {
    /// Current number of live connections.
    pub current_connections: usize,
    /// Current number of bound identities.
    pub bound_identities: usize,
    /// Total connections since start.
    pub total_connections: u64,
    /// Total events published since start.
    pub total_events: u64,
    /// Per-recipient deliveries dropped on a full queue.
    pub dropped_deliveries: u64,
}
