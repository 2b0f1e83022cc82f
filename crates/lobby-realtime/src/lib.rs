//! # Lobby Real-time
//!
//! Presence-aware broadcast core for the lobby chat service.
//!
//! Clients open a persistent connection, announce a display name, exchange
//! short messages and are declared absent when their connection drops, even
//! when the drop is silent. Every event goes to every connected client on the
//! single public topic.
//!
//! ## Components
//!
//! - **Connection**: one live link; owns its outbound queue and liveness state
//! - **PresenceRegistry**: live connections and the identities bound to them
//! - **BroadcastTopic**: one total order of events, fanned out per recipient
//! - **MessageRouter**: validates actions, mutates presence, publishes events
//! - **HeartbeatMonitor**: probes connections and retires the silent ones
//! - **Lobby**: the entry points a transport calls
//!
//! ## Example
//!
//! ```rust
//! use lobby_realtime::{Action, ChatEvent, Lobby, Outbound};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let lobby = Lobby::default();
//!
//! let (alice, _alice_rx) = lobby.accept().unwrap();
//! let (_bob, mut bob_rx) = lobby.accept().unwrap();
//!
//! lobby
//!     .on_inbound_frame(&alice.id, Action::Join { username: "alice".to_string() })
//!     .unwrap();
//!
//! assert_eq!(
//!     bob_rx.try_recv(),
//!     Some(Outbound::Event { sequence: 1, event: ChatEvent::join("alice") })
//! );
//!
//! // A late close after the leave has already been announced is a no-op.
//! assert!(lobby.on_connection_closed(&alice.id).is_some());
//! assert!(lobby.on_connection_closed(&alice.id).is_none());
//! # }
//! ```
//!
//! ## Wire Protocol
//!
//! ### Client -> Server
//!
//! ```json
//! {"destination": "chat.addUser", "payload": {"sender": "alice", "type": "JOIN"}}
//! {"destination": "chat.sendMessage", "payload": {"content": "gg", "type": "CHAT"}}
//! {"destination": "chat.removeUser"}
//! ```
//!
//! ### Server -> Client
//!
//! ```json
//! {"type": "message", "destination": "topic.public", "sequence": 3,
//!  "body": {"type": "CHAT", "sender": "alice", "content": "gg"}}
//! {"type": "error", "message": "invalid identity: username cannot be empty"}
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                    Lobby                      │
//! │                                               │
//! │  frame ──► MessageRouter ──► BroadcastTopic   │
//! │                 │                  │          │
//! │                 ▼                  ▼          │
//! │          PresenceRegistry ──► Connection(s)   │
//! │                 ▲               outbound      │
//! │                 │               queues        │
//! │          HeartbeatMonitor ──► depart()        │
//! └───────────────────────────────────────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod event;
pub mod heartbeat;
pub mod lobby;
pub mod presence;
pub mod protocol;
pub mod router;
pub mod topic;

// Re-export main types
pub use connection::{
    create_connection, Connection, ConnectionId, ConnectionMetadata, DeliveryFailure, Liveness,
    OutboundReceiver, ProbeStep,
};
pub use error::RealtimeError;
pub use event::{ChatEvent, EventKind};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor, SweepReport};
pub use lobby::{Lobby, LobbyConfig};
pub use presence::{IdentityBinding, PresenceEntry, PresenceRegistry};
pub use protocol::{
    Action, ChatPayload, InboundFrame, Outbound, ServerMessage, ADD_USER, PUBLIC_TOPIC,
    REMOVE_USER, SEND_MESSAGE,
};
pub use router::{
    DepartureCause, MessageRouter, RouterConfig, DEFAULT_MAX_CONTENT_LEN, DEFAULT_MAX_USERNAME_LEN,
};
pub use topic::{BroadcastTopic, Delivery, PublishTurn, Published, TopicStats};
