//! Inbound actions, outbound messages and the logical destinations that carry them.

use crate::error::RealtimeError;
use crate::event::{ChatEvent, EventKind};
use serde::{Deserialize, Serialize};

/// Destination for chat messages.
pub const SEND_MESSAGE: &str = "chat.sendMessage";

/// Destination for identity announcements.
pub const ADD_USER: &str = "chat.addUser";

/// Destination for explicit leaves.
pub const REMOVE_USER: &str = "chat.removeUser";

/// The single outbound topic every event is broadcast to.
pub const PUBLIC_TOPIC: &str = "topic.public";

/// Payload of an inbound frame. Mirrors the event shape so clients can send
/// what they receive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatPayload {
    /// Message text.
    #[serde(default)]
    pub content: Option<String>,
    /// Claimed username.
    #[serde(default)]
    pub sender: Option<String>,
    /// Kind hint from the client. Ignored: the destination decides.
    #[serde(default, rename = "type")]
    pub kind: Option<EventKind>,
}

/// A parsed inbound frame as delivered by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Logical destination, e.g. `chat.sendMessage`.
    pub destination: String,
    /// Message payload.
    #[serde(default)]
    pub payload: ChatPayload,
}

/// An action a client can perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Bind a display identity to the connection.
    Join { username: String },
    /// Send a chat message.
    Chat { content: String },
    /// Drop the connection's identity binding.
    Leave,
}

impl Action {
    /// Resolve an inbound frame into an action by its destination.
    pub fn from_frame(frame: InboundFrame) -> Result<Self, RealtimeError> {
        let InboundFrame {
            destination,
            payload,
        } = frame;

        // STOMP-style clients address application destinations as `/app/<name>`.
        let route = destination
            .trim_start_matches('/')
            .trim_start_matches("app/");

        match route {
            ADD_USER => Ok(Action::Join {
                username: payload.sender.unwrap_or_default(),
            }),
            SEND_MESSAGE => Ok(Action::Chat {
                content: payload.content.unwrap_or_default(),
            }),
            REMOVE_USER => Ok(Action::Leave),
            _ => Err(RealtimeError::UnknownDestination(destination.clone())),
        }
    }

    /// Parse a JSON text frame into an action.
    pub fn parse(text: &str) -> Result<Self, RealtimeError> {
        let frame: InboundFrame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    /// Destination this action is addressed to.
    pub fn destination(&self) -> &'static str {
        match self {
            Action::Join { .. } => ADD_USER,
            Action::Chat { .. } => SEND_MESSAGE,
            Action::Leave => REMOVE_USER,
        }
    }
}

/// Messages written to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// An event published on a topic.
    Message {
        destination: String,
        sequence: u64,
        body: ChatEvent,
    },
    /// An error caused by this client's own input.
    Error { message: String },
}

impl ServerMessage {
    /// Error reply for a rejected action.
    pub fn error(err: &RealtimeError) -> Self {
        ServerMessage::Error {
            message: err.to_string(),
        }
    }
}

/// An item in a connection's outbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A broadcast event with its position in the topic's total order.
    Event { sequence: u64, event: ChatEvent },
    /// A reply addressed to this connection only.
    Reply(ServerMessage),
    /// A liveness probe. The transport maps it to its own ping frame.
    Probe,
}

impl Outbound {
    /// Convert to a client message. Probes have no message form.
    pub fn into_message(self) -> Option<ServerMessage> {
        match self {
            Outbound::Event { sequence, event } => Some(ServerMessage::Message {
                destination: PUBLIC_TOPIC.to_string(),
                sequence,
                body: event,
            }),
            Outbound::Reply(message) => Some(message),
            Outbound::Probe => None,
        }
    }
}
