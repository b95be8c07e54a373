//! Socket event vocabulary for the blogchat realtime protocol.
//!
//! The wire format is a stream of [`Frame`]s, each a named event plus a JSON
//! payload. Outbound and inbound payloads are deliberately asymmetric where
//! the server enriches an event before rebroadcasting it: a private message
//! goes out as `{recipientId, message: {text}}` and comes back as a full
//! [`ChatMessage`]; a typing signal goes out as `{isTyping, recipientId}` and
//! comes back tagged with the sender's identity and scope.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{ChatMessage, ChatUser, Comment};

/// Event names used on the wire.
pub mod names {
    /// Handshake credentials, first frame after transport open.
    pub const AUTH: &str = "auth";
    /// Identity announcement so the server adds this client to the roster.
    pub const USER_CONNECT: &str = "user:connect";
    /// Full roster snapshot, replaces any previous one.
    pub const USERS_ONLINE: &str = "users:online";
    pub const CHAT_GLOBAL: &str = "chat:global";
    pub const CHAT_PRIVATE: &str = "chat:private";
    pub const CHAT_TYPING: &str = "chat:typing";
    pub const COMMENT_CREATE: &str = "comment:create";
    pub const COMMENT_NEW: &str = "comment:new";
    pub const JOIN_POST: &str = "joinPost";
    pub const LEAVE_POST: &str = "leavePost";
    /// Transport lifecycle signals, synthesized client-side.
    pub const CONNECT: &str = "connect";
    pub const DISCONNECT: &str = "disconnect";
    pub const CONNECT_ERROR: &str = "connect_error";
}

/// One unit of the wire protocol: an event name and its JSON payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Credentials presented during transport negotiation.
///
/// `token: null` is a valid handshake; the server treats the connection as a
/// guest session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthPayload {
    pub token: Option<String>,
}

impl AuthPayload {
    pub fn into_frame(self) -> Frame {
        Frame::new(names::AUTH, json!({ "token": self.token }))
    }
}

/// An outbound event, as emitted by this client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Announce identity after (re)connecting.
    UserConnect { username: String },
    GlobalMessage { text: String },
    PrivateMessage { recipient_id: String, text: String },
    Typing {
        is_typing: bool,
        recipient_id: Option<String>,
    },
    CommentCreate { post_id: String, comment: Comment },
    JoinPost { post_id: String },
    LeavePost { post_id: String },
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::UserConnect { .. } => names::USER_CONNECT,
            ClientEvent::GlobalMessage { .. } => names::CHAT_GLOBAL,
            ClientEvent::PrivateMessage { .. } => names::CHAT_PRIVATE,
            ClientEvent::Typing { .. } => names::CHAT_TYPING,
            ClientEvent::CommentCreate { .. } => names::COMMENT_CREATE,
            ClientEvent::JoinPost { .. } => names::JOIN_POST,
            ClientEvent::LeavePost { .. } => names::LEAVE_POST,
        }
    }

    /// Build the outbound wire payload for this event.
    pub fn payload(&self) -> Value {
        match self {
            ClientEvent::UserConnect { username } => json!({ "username": username }),
            ClientEvent::GlobalMessage { text } => json!({ "text": text }),
            ClientEvent::PrivateMessage { recipient_id, text } => json!({
                "recipientId": recipient_id,
                "message": { "text": text },
            }),
            ClientEvent::Typing {
                is_typing,
                recipient_id,
            } => json!({
                "isTyping": is_typing,
                "recipientId": recipient_id,
            }),
            ClientEvent::CommentCreate { post_id, comment } => json!({
                "postId": post_id,
                "comment": comment,
            }),
            // Room membership events carry the bare post id.
            ClientEvent::JoinPost { post_id } | ClientEvent::LeavePost { post_id } => {
                Value::String(post_id.clone())
            }
        }
    }

    pub fn into_frame(self) -> Frame {
        Frame::new(self.name(), self.payload())
    }
}

/// An inbound typing signal, tagged by the server with the sender's identity
/// and whether it was addressed privately to this client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingSignal {
    pub user_id: String,
    pub username: String,
    pub is_typing: bool,
    #[serde(rename = "private", default)]
    pub private: bool,
}

/// An inbound event, as delivered to this client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Wholesale roster replacement; may still include the local user.
    OnlineUsers(Vec<ChatUser>),
    Global(ChatMessage),
    Private(ChatMessage),
    Typing(TypingSignal),
    CommentNew { post_id: String, comment: Comment },
    Connected,
    Disconnected,
    ConnectError { message: String },
}

impl ServerEvent {
    /// Decode a named event payload. Returns `Ok(None)` for event names this
    /// client does not consume, so unknown server traffic is skipped rather
    /// than treated as an error.
    pub fn parse(event: &str, data: &Value) -> Result<Option<Self>, serde_json::Error> {
        let parsed = match event {
            names::USERS_ONLINE => {
                Some(ServerEvent::OnlineUsers(serde_json::from_value(data.clone())?))
            }
            names::CHAT_GLOBAL => Some(ServerEvent::Global(serde_json::from_value(data.clone())?)),
            names::CHAT_PRIVATE => {
                Some(ServerEvent::Private(serde_json::from_value(data.clone())?))
            }
            names::CHAT_TYPING => Some(ServerEvent::Typing(serde_json::from_value(data.clone())?)),
            names::COMMENT_NEW => {
                #[derive(Deserialize)]
                #[serde(rename_all = "camelCase")]
                struct CommentNew {
                    post_id: String,
                    comment: Comment,
                }
                let CommentNew { post_id, comment } = serde_json::from_value(data.clone())?;
                Some(ServerEvent::CommentNew { post_id, comment })
            }
            names::CONNECT => Some(ServerEvent::Connected),
            names::DISCONNECT => Some(ServerEvent::Disconnected),
            names::CONNECT_ERROR => {
                let message = data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection error")
                    .to_string();
                Some(ServerEvent::ConnectError { message })
            }
            _ => None,
        };
        Ok(parsed)
    }
}
