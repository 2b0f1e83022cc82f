//! Connection handles and liveness state.

use crate::error::RealtimeError;
use crate::protocol::{Outbound, ServerMessage};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Unique identifier for a connection, assigned at accept time.
pub type ConnectionId = String;

/// Liveness of a connection. `Dead` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Accepted, no traffic seen yet.
    Pending,
    /// Has sent at least one action or probe reply.
    Alive,
    /// Closed or timed out. Never leaves this state.
    Dead,
}

/// Why a delivery to one connection did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryFailure {
    /// Outbound queue is at capacity; the item was dropped.
    QueueFull,
    /// The receiving side is gone or the connection is dead.
    Closed,
}

/// Outcome of a heartbeat check on one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    /// No probe outstanding; one should be sent now.
    Probe,
    /// A probe is outstanding and its deadline has not passed.
    Waiting,
    /// The outstanding probe went unanswered.
    Expired,
    /// Already dead; nothing to do.
    Dead,
}

#[derive(Debug)]
struct LivenessState {
    liveness: Liveness,
    last_activity: Instant,
    probe_deadline: Option<Instant>,
}

/// A live duplex link to one client.
///
/// The core only enqueues onto the connection and tracks its liveness; the
/// transport owns the socket and drains the matching [`OutboundReceiver`].
#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier.
    pub id: ConnectionId,
    /// Queue towards the transport's writer.
    sender: mpsc::Sender<Outbound>,
    /// Liveness state shared by inbound processing and the heartbeat sweep.
    state: Mutex<LivenessState>,
    /// Cancelled once the connection is dead.
    closed: CancellationToken,
    /// Items dropped because the queue was full.
    dropped: AtomicU64,
    /// Connection metadata.
    pub metadata: ConnectionMetadata,
}

impl Connection {
    /// Create a new pending connection with an outbound sender.
    pub fn new(id: ConnectionId, sender: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            sender,
            state: Mutex::new(LivenessState {
                liveness: Liveness::Pending,
                last_activity: Instant::now(),
                probe_deadline: None,
            }),
            closed: CancellationToken::new(),
            dropped: AtomicU64::new(0),
            metadata: ConnectionMetadata::now(),
        }
    }

    /// Hand an item to the connection's queue without waiting.
    pub fn enqueue(&self, item: Outbound) -> Result<(), DeliveryFailure> {
        if self.closed.is_cancelled() {
            return Err(DeliveryFailure::Closed);
        }

        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(DeliveryFailure::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(DeliveryFailure::Closed),
        }
    }

    /// Send a reply to this connection only.
    pub fn reply(&self, message: ServerMessage) -> Result<(), RealtimeError> {
        self.enqueue(Outbound::Reply(message))
            .map_err(|_| RealtimeError::ChannelClosed)
    }

    /// Record inbound traffic at `now`.
    ///
    /// Clears any outstanding probe deadline and promotes a pending
    /// connection. Returns `true` if this call promoted it.
    pub fn touch(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        if state.liveness == Liveness::Dead {
            return false;
        }

        state.last_activity = now;
        state.probe_deadline = None;

        if state.liveness == Liveness::Pending {
            state.liveness = Liveness::Alive;
            return true;
        }
        false
    }

    /// Advance the heartbeat state machine at `now`.
    ///
    /// When no probe is outstanding, arms a deadline of `now + reply_deadline`
    /// and returns [`ProbeStep::Probe`]; the caller is expected to send it.
    pub fn check_probe(&self, now: Instant, reply_deadline: Duration) -> ProbeStep {
        let mut state = self.state.lock();
        match (state.liveness, state.probe_deadline) {
            (Liveness::Dead, _) => ProbeStep::Dead,
            (_, Some(deadline)) if now >= deadline => ProbeStep::Expired,
            (_, Some(_)) => ProbeStep::Waiting,
            (_, None) => {
                state.probe_deadline = Some(now + reply_deadline);
                ProbeStep::Probe
            }
        }
    }

    /// Transition to `Dead`. Returns `true` only for the call that made the
    /// transition.
    ///
    /// Anything still queued for the connection is discarded.
    pub fn mark_dead(&self) -> bool {
        let mut state = self.state.lock();
        if state.liveness == Liveness::Dead {
            return false;
        }
        state.liveness = Liveness::Dead;
        state.probe_deadline = None;
        drop(state);

        self.closed.cancel();
        true
    }

    /// Current liveness.
    pub fn liveness(&self) -> Liveness {
        self.state.lock().liveness
    }

    /// Whether the connection is dead.
    pub fn is_dead(&self) -> bool {
        self.liveness() == Liveness::Dead
    }

    /// Time since the last inbound traffic (or accept), as seen at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.state.lock().last_activity)
    }

    /// Number of items dropped on a full queue.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Token cancelled when the connection dies.
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// Metadata about a connection.
#[derive(Debug, Default)]
pub struct ConnectionMetadata {
    /// When the connection was accepted (Unix timestamp).
    pub connected_at: u64,
}

impl ConnectionMetadata {
    /// Create metadata with current timestamp.
    pub fn now() -> Self {
        Self {
            connected_at: unix_now(),
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Receiving half of a connection's outbound queue, held by the transport.
///
/// Yields nothing once the connection is dead, even if items are still
/// queued: those are discarded.
#[derive(Debug)]
pub struct OutboundReceiver {
    receiver: mpsc::Receiver<Outbound>,
    closed: CancellationToken,
}

impl OutboundReceiver {
    /// Wait for the next outbound item. `None` once the connection is dead.
    pub async fn recv(&mut self) -> Option<Outbound> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => {
                self.receiver.close();
                None
            }
            item = self.receiver.recv() => item,
        }
    }

    /// Take the next outbound item if one is ready.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        if self.closed.is_cancelled() {
            self.receiver.close();
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Drain everything currently queued.
    pub fn drain(&mut self) -> Vec<Outbound> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// Create a new connection with its outbound receiver.
pub fn create_connection(id: ConnectionId, capacity: usize) -> (Arc<Connection>, OutboundReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let connection = Arc::new(Connection::new(id, sender));
    let receiver = OutboundReceiver {
        receiver,
        closed: connection.closed(),
    };
    (connection, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChatEvent;

    fn event(n: u64) -> Outbound {
        Outbound::Event {
            sequence: n,
            event: ChatEvent::chat(None, format!("m{n}")),
        }
    }

    #[test]
    fn test_connection_creation() {
        let (conn, _rx) = create_connection("c1".to_string(), 8);
        assert_eq!(conn.id, "c1");
        assert_eq!(conn.liveness(), Liveness::Pending);
        assert_eq!(conn.dropped_count(), 0);
        assert!(conn.metadata.connected_at > 0);
    }

    #[test]
    fn test_touch_promotes_pending() {
        let (conn, _rx) = create_connection("c1".to_string(), 8);
        assert!(conn.touch(Instant::now()));
        assert_eq!(conn.liveness(), Liveness::Alive);
        assert!(!conn.touch(Instant::now()));
    }

    #[test]
    fn test_idle_time_resets_on_touch() {
        let (conn, _rx) = create_connection("c1".to_string(), 8);
        let start = Instant::now();

        conn.touch(start);
        assert_eq!(conn.idle_for(start + Duration::from_secs(7)), Duration::from_secs(7));

        conn.touch(start + Duration::from_secs(5));
        assert_eq!(conn.idle_for(start + Duration::from_secs(7)), Duration::from_secs(2));

        // A clock reading older than the last touch is not negative idle time.
        assert_eq!(conn.idle_for(start), Duration::ZERO);

        // Traffic after death is not recorded.
        conn.mark_dead();
        conn.touch(start + Duration::from_secs(20));
        assert_eq!(conn.idle_for(start + Duration::from_secs(20)), Duration::from_secs(15));
    }

    #[test]
    fn test_enqueue_and_receive() {
        let (conn, mut rx) = create_connection("c1".to_string(), 8);
        conn.enqueue(event(1)).unwrap();
        conn.enqueue(event(2)).unwrap();

        assert_eq!(rx.drain(), vec![event(1), event(2)]);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let (conn, _rx) = create_connection("c1".to_string(), 1);
        conn.enqueue(event(1)).unwrap();

        assert_eq!(conn.enqueue(event(2)), Err(DeliveryFailure::QueueFull));
        assert_eq!(conn.dropped_count(), 1);
    }

    #[test]
    fn test_enqueue_after_receiver_dropped() {
        let (conn, rx) = create_connection("c1".to_string(), 4);
        drop(rx);
        assert_eq!(conn.enqueue(event(1)), Err(DeliveryFailure::Closed));
    }

    #[test]
    fn test_mark_dead_exactly_once() {
        let (conn, _rx) = create_connection("c1".to_string(), 4);
        assert!(conn.mark_dead());
        assert!(!conn.mark_dead());
        assert!(conn.is_dead());
        assert!(!conn.touch(Instant::now()));
        assert_eq!(conn.liveness(), Liveness::Dead);
    }

    #[test]
    fn test_dead_connection_discards_queue() {
        let (conn, mut rx) = create_connection("c1".to_string(), 4);
        conn.enqueue(event(1)).unwrap();
        conn.mark_dead();

        assert!(rx.try_recv().is_none());
        assert_eq!(conn.enqueue(event(2)), Err(DeliveryFailure::Closed));
    }

    #[tokio::test]
    async fn test_recv_returns_none_after_death() {
        let (conn, mut rx) = create_connection("c1".to_string(), 4);
        conn.enqueue(event(1)).unwrap();
        assert_eq!(rx.recv().await, Some(event(1)));

        conn.enqueue(event(2)).unwrap();
        conn.mark_dead();
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_probe_state_machine() {
        let (conn, _rx) = create_connection("c1".to_string(), 4);
        let start = Instant::now();
        let deadline = Duration::from_secs(10);

        assert_eq!(conn.check_probe(start, deadline), ProbeStep::Probe);
        assert_eq!(
            conn.check_probe(start + Duration::from_secs(5), deadline),
            ProbeStep::Waiting
        );
        assert_eq!(
            conn.check_probe(start + Duration::from_secs(10), deadline),
            ProbeStep::Expired
        );

        // A reply clears the outstanding probe.
        conn.touch(start + Duration::from_secs(11));
        assert_eq!(
            conn.check_probe(start + Duration::from_secs(12), deadline),
            ProbeStep::Probe
        );

        conn.mark_dead();
        assert_eq!(
            conn.check_probe(start + Duration::from_secs(30), deadline),
            ProbeStep::Dead
        );
    }
}
