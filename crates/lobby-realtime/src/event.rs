//! Lobby event types.

use serde::{Deserialize, Serialize};

/// Kind of event carried on the public topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// A chat message.
    Chat,
    /// A user announced a display identity.
    Join,
    /// A user's identity binding was destroyed.
    Leave,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Chat => write!(f, "chat"),
            EventKind::Join => write!(f, "join"),
            EventKind::Leave => write!(f, "leave"),
        }
    }
}

/// An event broadcast to every connection on the public topic.
///
/// Events are plain values: each recipient receives its own clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Username of the sender, absent when the sender never joined.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Message text. Only present for chat events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatEvent {
    /// A chat message from `sender`.
    pub fn chat(sender: Option<String>, content: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Chat,
            sender,
            content: Some(content.into()),
        }
    }

    /// A join announcement for `username`.
    pub fn join(username: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Join,
            sender: Some(username.into()),
            content: None,
        }
    }

    /// A leave announcement for `username`.
    pub fn leave(username: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Leave,
            sender: Some(username.into()),
            content: None,
        }
    }

    /// Sender as a string slice, if any.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }
}
