//! Chat data model shared by every part of the realtime client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat participant as the server identifies it.
///
/// `uid` is stable for the session; for guests it is synthesized client-side
/// and regenerated on every session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatUser {
    pub uid: String,
    pub username: String,
}

impl ChatUser {
    pub fn new(uid: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            username: username.into(),
        }
    }
}

/// A delivered chat message. `recipient = None` marks the global channel.
///
/// Immutable once created; logs order messages by delivery, not by timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender: ChatUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChatUser>,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn is_private(&self) -> bool {
        self.recipient.is_some()
    }
}

/// A comment delivered through a post's comment room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub text: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
}
