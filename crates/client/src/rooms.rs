//! Per-post comment rooms.
//!
//! A blog post's comment thread updates live while the post is open. Joining
//! a [`CommentRoom`] announces the membership to the server, which then
//! routes that post's `comment:new` traffic to this client; dropping the room
//! leaves it again. Comments are append-only and server-authoritative: a sent
//! comment shows up only once the server rebroadcasts it to the room.

use std::sync::{Arc, Mutex};

use blogchat_shared::protocol::names;
use blogchat_shared::{ChatUser, ClientEvent, Comment, ServerEvent};
use chrono::Utc;
use serde_json::Value;

use crate::log_warn;
use crate::session::{EventSink, SharedSink};
use crate::socket::{SocketConnection, Subscription};

#[cfg(not(target_arch = "wasm32"))]
type CommentListener = Arc<dyn Fn(&Comment) + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type CommentListener = Arc<dyn Fn(&Comment)>;

struct RoomInner {
    post_id: String,
    sink: SharedSink,
    comments: Mutex<Vec<Comment>>,
    listeners: Mutex<Vec<CommentListener>>,
}

/// Membership in one post's comment room. Joins on creation, leaves on drop.
pub struct CommentRoom {
    inner: Arc<RoomInner>,
    subscription: Mutex<Option<Subscription>>,
}

impl CommentRoom {
    /// Join the room for `post_id`, announcing the membership through `sink`.
    pub fn new(post_id: impl Into<String>, sink: SharedSink) -> Self {
        let post_id = post_id.into();
        sink.emit(ClientEvent::JoinPost {
            post_id: post_id.clone(),
        });
        Self {
            inner: Arc::new(RoomInner {
                post_id,
                sink,
                comments: Mutex::new(Vec::new()),
                listeners: Mutex::new(Vec::new()),
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Join a room fed by the shared connection.
    pub fn join(connection: &SocketConnection, post_id: impl Into<String>) -> Self {
        let room = Self::new(post_id, Arc::new(connection.clone()) as SharedSink);
        room.attach(connection);
        room
    }

    /// Wire the room to the connection. Keyed per post, so rejoining the same
    /// post replaces the previous wiring instead of stacking handlers.
    pub fn attach(&self, connection: &SocketConnection) {
        let key = format!("room:{}", self.inner.post_id);
        let weak = Arc::downgrade(&self.inner);
        let subscription =
            connection.subscribe_keyed(names::COMMENT_NEW, &key, move |data: &Value| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match ServerEvent::parse(names::COMMENT_NEW, data) {
                    Ok(Some(event)) => apply_event(&inner, event),
                    Ok(None) => {}
                    Err(err) => log_warn!("bad {} payload: {}", names::COMMENT_NEW, err),
                }
            });
        *self
            .subscription
            .lock()
            .expect("subscription lock poisoned") = Some(subscription);
    }

    pub fn post_id(&self) -> &str {
        &self.inner.post_id
    }

    /// Apply one inbound event. Comments addressed to other rooms are ignored.
    pub fn apply(&self, event: ServerEvent) {
        apply_event(&self.inner, event);
    }

    /// Submit a comment on this post. Returns whether it was accepted for
    /// send; the local log is only updated once the server rebroadcasts it.
    pub fn send_comment(&self, text: &str, author: &ChatUser) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.inner.sink.emit(ClientEvent::CommentCreate {
            post_id: self.inner.post_id.clone(),
            comment: Comment {
                text: text.to_string(),
                author: author.username.clone(),
                created_at: Utc::now(),
            },
        });
        true
    }

    pub fn comments(&self) -> Vec<Comment> {
        self.inner
            .comments
            .lock()
            .expect("comments lock poisoned")
            .clone()
    }

    /// Register a listener for newly delivered comments.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn on_comment(&self, listener: impl Fn(&Comment) + Send + Sync + 'static) {
        self.inner
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .push(Arc::new(listener));
    }

    #[cfg(target_arch = "wasm32")]
    pub fn on_comment(&self, listener: impl Fn(&Comment) + 'static) {
        self.inner
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .push(Arc::new(listener));
    }
}

impl Drop for CommentRoom {
    fn drop(&mut self) {
        self.inner.sink.emit(ClientEvent::LeavePost {
            post_id: self.inner.post_id.clone(),
        });
    }
}

fn apply_event(inner: &RoomInner, event: ServerEvent) {
    let ServerEvent::CommentNew { post_id, comment } = event else {
        return;
    };
    if post_id != inner.post_id {
        return;
    }
    inner
        .comments
        .lock()
        .expect("comments lock poisoned")
        .push(comment.clone());
    let listeners: Vec<CommentListener> = inner
        .listeners
        .lock()
        .expect("listeners lock poisoned")
        .clone();
    for listener in listeners {
        listener(&comment);
    }
}
