//! Per-tab chat session state, derived from the server's event stream.
//!
//! [`ChatSession`] keeps the online roster, the global message log, the
//! per-peer private logs, and the two "currently typing" sets, and exposes
//! intent methods that turn user actions into outbound events. It is fed by
//! the shared [`SocketConnection`] through `attach`, but all state
//! transitions go through [`ChatSession::apply`], so the store is fully
//! exercisable without a transport.
//!
//! Consumers observe the store explicitly: register a change listener, pull
//! a [`SessionSnapshot`] (or one of the derived views) when notified.
//! Everything here is in-memory and dies with the session; the server only
//! re-sends the presence roster on reconnect, never history.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use blogchat_shared::protocol::names;
use blogchat_shared::{ChatMessage, ChatUser, ClientEvent, ServerEvent};
use serde_json::Value;

use crate::log_warn;
use crate::socket::{SocketConnection, Subscription};
use crate::timer::DebounceTimer;

/// Quiet period after the last keystroke before the typing-stop signal.
pub const TYPING_QUIET_PERIOD: Duration = Duration::from_secs(1);

/// Dispatcher key for the session's own subscriptions; re-attaching replaces
/// them instead of stacking.
const SUBSCRIBER_KEY: &str = "session";

/// Whether a message or typing signal addresses everyone or one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Private,
}

/// Outbound seam between the session and the connection, injectable so tests
/// can record emissions instead of hitting a transport.
#[cfg(not(target_arch = "wasm32"))]
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ClientEvent);
}
#[cfg(target_arch = "wasm32")]
pub trait EventSink {
    fn emit(&self, event: ClientEvent);
}

pub type SharedSink = Arc<dyn EventSink>;

impl EventSink for SocketConnection {
    fn emit(&self, event: ClientEvent) {
        self.publish(event.name(), event.payload());
    }
}

/// A copy of the session state at one instant.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Online users, excluding self.
    pub online: Vec<ChatUser>,
    pub global: Vec<ChatMessage>,
    /// Private logs keyed by peer uid, created lazily on first traffic.
    pub private: HashMap<String, Vec<ChatMessage>>,
    pub typing_global: BTreeSet<String>,
    pub typing_private: BTreeSet<String>,
}

#[cfg(not(target_arch = "wasm32"))]
type ChangeListener = Arc<dyn Fn() + Send + Sync>;
#[cfg(target_arch = "wasm32")]
type ChangeListener = Arc<dyn Fn()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct SessionInner {
    me: ChatUser,
    sink: SharedSink,
    state: Mutex<SessionSnapshot>,
    listeners: Mutex<HashMap<u64, ChangeListener>>,
    next_listener: AtomicU64,
    typing_timer: DebounceTimer,
    subscriptions: Mutex<Vec<Subscription>>,
    closed: AtomicBool,
}

#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    pub fn new(me: ChatUser, sink: SharedSink) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                me,
                sink,
                state: Mutex::new(SessionSnapshot::default()),
                listeners: Mutex::new(HashMap::new()),
                next_listener: AtomicU64::new(0),
                typing_timer: DebounceTimer::new(),
                subscriptions: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn me(&self) -> &ChatUser {
        &self.inner.me
    }

    /// Wire this session to the shared connection. Uses keyed subscriptions,
    /// so attaching again replaces the previous wiring.
    pub fn attach(&self, connection: &SocketConnection) {
        let events = [
            names::USERS_ONLINE,
            names::CHAT_GLOBAL,
            names::CHAT_PRIVATE,
            names::CHAT_TYPING,
            names::CONNECT,
            names::DISCONNECT,
            names::CONNECT_ERROR,
        ];
        let mut subscriptions = self
            .inner
            .subscriptions
            .lock()
            .expect("subscriptions lock poisoned");
        subscriptions.clear();
        for event in events {
            let weak = Arc::downgrade(&self.inner);
            let handler = move |data: &Value| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match ServerEvent::parse(event, data) {
                    Ok(Some(parsed)) => apply_event(&inner, parsed),
                    Ok(None) => {}
                    Err(err) => log_warn!("bad {} payload: {}", event, err),
                }
            };
            subscriptions.push(connection.subscribe_keyed(event, SUBSCRIBER_KEY, handler));
        }
    }

    /// Apply one inbound event to the session state.
    pub fn apply(&self, event: ServerEvent) {
        apply_event(&self.inner, event);
    }

    /// Send a message to the global channel, or privately to `to`. Empty and
    /// whitespace-only text is rejected locally, with no network call.
    /// Returns whether the message was accepted for send.
    pub fn send_message(&self, text: &str, to: Option<&ChatUser>) -> bool {
        if self.inner.closed.load(Ordering::SeqCst) {
            return false;
        }
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        let event = match to {
            Some(peer) => ClientEvent::PrivateMessage {
                recipient_id: peer.uid.clone(),
                text: text.to_string(),
            },
            None => ClientEvent::GlobalMessage {
                text: text.to_string(),
            },
        };
        self.inner.sink.emit(event);
        true
    }

    /// Call on every keystroke in the composer. Emits a typing-start signal
    /// immediately and (re)arms the stop timer; the stop signal goes out
    /// exactly once, [`TYPING_QUIET_PERIOD`] after the last keystroke.
    pub fn notify_typing(&self, to: Option<&ChatUser>) {
        if self.inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let recipient_id = to.map(|peer| peer.uid.clone());
        self.inner.sink.emit(ClientEvent::Typing {
            is_typing: true,
            recipient_id: recipient_id.clone(),
        });
        let weak = Arc::downgrade(&self.inner);
        self.inner.typing_timer.arm(TYPING_QUIET_PERIOD, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if inner.closed.load(Ordering::SeqCst) {
                return;
            }
            inner.sink.emit(ClientEvent::Typing {
                is_typing: false,
                recipient_id,
            });
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.lock().expect("state lock poisoned").clone()
    }

    pub fn online_users(&self) -> Vec<ChatUser> {
        self.snapshot().online
    }

    /// The log for the current conversation: a peer's private log, or the
    /// global log when no peer is selected.
    pub fn conversation(&self, peer: Option<&str>) -> Vec<ChatMessage> {
        let state = self.inner.state.lock().expect("state lock poisoned");
        match peer {
            Some(uid) => state.private.get(uid).cloned().unwrap_or_default(),
            None => state.global.clone(),
        }
    }

    /// Human-readable typing indicator for a scope, e.g. "ann is typing..."
    /// Typing users are resolved through the roster; a peer who has left is
    /// silently omitted. `None` when nobody (resolvable) is typing.
    pub fn typing_line(&self, scope: Scope) -> Option<String> {
        let state = self.inner.state.lock().expect("state lock poisoned");
        let typing = match scope {
            Scope::Global => &state.typing_global,
            Scope::Private => &state.typing_private,
        };
        let names: Vec<&str> = typing
            .iter()
            .filter_map(|uid| {
                state
                    .online
                    .iter()
                    .find(|user| &user.uid == uid)
                    .map(|user| user.username.as_str())
            })
            .collect();
        if names.is_empty() {
            return None;
        }
        let verb = if names.len() == 1 { "is" } else { "are" };
        Some(format!("{} {} typing...", names.join(", "), verb))
    }

    /// Register a change listener, invoked after every state transition.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn on_change(&self, listener: impl Fn() + Send + Sync + 'static) -> ListenerId {
        self.register_listener(Arc::new(listener))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn on_change(&self, listener: impl Fn() + 'static) -> ListenerId {
        self.register_listener(Arc::new(listener))
    }

    fn register_listener(&self, listener: ChangeListener) -> ListenerId {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        self.inner
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .insert(id, listener);
        ListenerId(id)
    }

    pub fn remove_listener(&self, id: ListenerId) {
        self.inner
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .remove(&id.0);
    }

    /// Tear the session down: cancel the pending typing stop, drop every
    /// connection subscription and change listener. Nothing reaches the
    /// transport afterwards.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.typing_timer.cancel();
        self.inner
            .subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .clear();
        self.inner
            .listeners
            .lock()
            .expect("listeners lock poisoned")
            .clear();
    }
}

fn apply_event(inner: &SessionInner, event: ServerEvent) {
    if inner.closed.load(Ordering::SeqCst) {
        return;
    }
    let mut changed = true;
    let mut announce = false;
    {
        let mut state = inner.state.lock().expect("state lock poisoned");
        match event {
            ServerEvent::OnlineUsers(roster) => {
                // Wholesale replacement, minus self.
                state.online = roster
                    .into_iter()
                    .filter(|user| user.uid != inner.me.uid)
                    .collect();
            }
            ServerEvent::Global(message) => state.global.push(message),
            ServerEvent::Private(message) => {
                // The log key is whichever side of the exchange is not us.
                let peer = if message.sender.uid == inner.me.uid {
                    message.recipient.as_ref().map(|user| user.uid.clone())
                } else {
                    Some(message.sender.uid.clone())
                };
                match peer {
                    Some(peer) => state.private.entry(peer).or_default().push(message),
                    None => {
                        changed = false;
                        log_warn!("dropping private message without a recipient");
                    }
                }
            }
            ServerEvent::Typing(signal) => {
                let set = if signal.private {
                    &mut state.typing_private
                } else {
                    &mut state.typing_global
                };
                if signal.is_typing {
                    set.insert(signal.user_id);
                } else {
                    set.remove(&signal.user_id);
                }
            }
            ServerEvent::Connected => {
                changed = false;
                announce = true;
            }
            ServerEvent::Disconnected => {
                // Presence and typing are live-only; message logs survive a
                // transient drop.
                state.online.clear();
                state.typing_global.clear();
                state.typing_private.clear();
            }
            ServerEvent::ConnectError { message } => {
                changed = false;
                log_warn!("chat connection error: {}", message);
            }
            ServerEvent::CommentNew { .. } => {
                // Comment rooms consume these; not session state.
                changed = false;
            }
        }
    }
    if announce {
        inner.sink.emit(ClientEvent::UserConnect {
            username: inner.me.username.clone(),
        });
    }
    if changed {
        notify(inner);
    }
}

fn notify(inner: &SessionInner) {
    let listeners: Vec<ChangeListener> = inner
        .listeners
        .lock()
        .expect("listeners lock poisoned")
        .values()
        .cloned()
        .collect();
    for listener in listeners {
        listener();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blogchat_shared::TypingSignal;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<ClientEvent>>,
    }

    impl RecordingSink {
        fn events(&self) -> Vec<ClientEvent> {
            self.events.lock().unwrap().clone()
        }

        fn typing_events(&self) -> Vec<(bool, Option<String>)> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    ClientEvent::Typing {
                        is_typing,
                        recipient_id,
                    } => Some((is_typing, recipient_id)),
                    _ => None,
                })
                .collect()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: ClientEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn session() -> (ChatSession, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let session = ChatSession::new(ChatUser::new("me", "Me"), sink.clone() as SharedSink);
        (session, sink)
    }

    fn user(uid: &str) -> ChatUser {
        ChatUser::new(uid, uid.to_uppercase())
    }

    fn global_msg(from: &str, text: &str) -> ServerEvent {
        ServerEvent::Global(ChatMessage {
            sender: user(from),
            recipient: None,
            text: text.into(),
            timestamp: Utc::now(),
        })
    }

    fn private_msg(from: &str, to: &str, text: &str) -> ServerEvent {
        ServerEvent::Private(ChatMessage {
            sender: user(from),
            recipient: Some(user(to)),
            text: text.into(),
            timestamp: Utc::now(),
        })
    }

    fn typing(uid: &str, is_typing: bool, private: bool) -> ServerEvent {
        ServerEvent::Typing(TypingSignal {
            user_id: uid.into(),
            username: uid.to_uppercase(),
            is_typing,
            private,
        })
    }

    #[test]
    fn roster_snapshots_replace_presence_and_never_contain_self() {
        let (session, _) = session();
        session.apply(ServerEvent::OnlineUsers(vec![user("me"), user("a"), user("b")]));
        assert_eq!(session.online_users(), vec![user("a"), user("b")]);

        // Replaced wholesale, not diffed.
        session.apply(ServerEvent::OnlineUsers(vec![user("b"), user("me")]));
        assert_eq!(session.online_users(), vec![user("b")]);
    }

    #[test]
    fn interleaved_traffic_routes_to_exactly_one_log_each() {
        let (session, _) = session();
        session.apply(global_msg("a", "g1"));
        session.apply(private_msg("a", "me", "to me from a"));
        session.apply(private_msg("me", "b", "to b from me"));
        session.apply(global_msg("b", "g2"));
        session.apply(private_msg("a", "me", "again"));

        let snapshot = session.snapshot();
        let texts = |log: &[ChatMessage]| log.iter().map(|m| m.text.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&snapshot.global), vec!["g1", "g2"]);
        assert_eq!(texts(&snapshot.private["a"]), vec!["to me from a", "again"]);
        assert_eq!(texts(&snapshot.private["b"]), vec!["to b from me"]);
        assert_eq!(snapshot.private.len(), 2);
    }

    #[test]
    fn messages_for_background_peers_still_append() {
        let (session, _) = session();
        // "Viewing" peer a changes nothing about how b's traffic lands.
        session.apply(private_msg("b", "me", "unseen"));
        assert_eq!(session.conversation(Some("a")), Vec::<ChatMessage>::new());
        assert_eq!(session.conversation(Some("b")).len(), 1);
    }

    #[test]
    fn whitespace_only_send_is_rejected_with_no_outbound_traffic() {
        let (session, sink) = session();
        assert!(!session.send_message("", None));
        assert!(!session.send_message("   \t\n", Some(&user("a"))));
        assert!(sink.events().is_empty());
        assert!(session.snapshot().global.is_empty());
    }

    #[test]
    fn send_message_addresses_the_selected_peer() {
        let (session, sink) = session();
        assert!(session.send_message("hello all", None));
        assert!(session.send_message("  psst  ", Some(&user("b"))));
        assert_eq!(
            sink.events(),
            vec![
                ClientEvent::GlobalMessage {
                    text: "hello all".into()
                },
                ClientEvent::PrivateMessage {
                    recipient_id: "b".into(),
                    text: "psst".into()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn continuous_typing_emits_exactly_one_stop_after_quiescence() {
        let (session, sink) = session();
        for _ in 0..5 {
            session.notify_typing(Some(&user("b")));
            tokio::time::sleep(Duration::from_millis(400)).await;
        }
        let stops_before: Vec<_> = sink
            .typing_events()
            .into_iter()
            .filter(|(is_typing, _)| !is_typing)
            .collect();
        assert!(stops_before.is_empty(), "no stop while typing continues");

        tokio::time::sleep(Duration::from_millis(1100)).await;
        let events = sink.typing_events();
        assert_eq!(events.len(), 6, "five starts and one stop");
        assert_eq!(events[5], (false, Some("b".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn no_typing_stop_after_shutdown() {
        let (session, sink) = session();
        session.notify_typing(None);
        session.shutdown();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.typing_events(), vec![(true, None)]);
    }

    #[test]
    fn a_drop_clears_presence_but_retains_every_log() {
        let (session, _) = session();
        session.apply(ServerEvent::OnlineUsers(vec![user("a"), user("b")]));
        session.apply(global_msg("a", "hello"));
        session.apply(private_msg("b", "me", "hey"));
        session.apply(typing("a", true, false));

        session.apply(ServerEvent::Disconnected);
        let snapshot = session.snapshot();
        assert!(snapshot.online.is_empty());
        assert!(snapshot.typing_global.is_empty());
        assert_eq!(snapshot.global.len(), 1);
        assert_eq!(snapshot.private["b"].len(), 1);

        // Reconnect: roster comes from the fresh snapshot, logs are intact.
        session.apply(ServerEvent::Connected);
        session.apply(ServerEvent::OnlineUsers(vec![user("b")]));
        let snapshot = session.snapshot();
        assert_eq!(snapshot.online, vec![user("b")]);
        assert_eq!(snapshot.global.len(), 1);
    }

    #[test]
    fn identity_is_announced_on_every_connect() {
        let (session, sink) = session();
        session.apply(ServerEvent::Connected);
        session.apply(ServerEvent::Disconnected);
        session.apply(ServerEvent::Connected);
        let announcements = sink
            .events()
            .into_iter()
            .filter(|event| matches!(event, ClientEvent::UserConnect { username } if username == "Me"))
            .count();
        assert_eq!(announcements, 2);
    }

    #[test]
    fn peer_comes_online_chats_globally_then_privately() {
        let (session, sink) = session();
        // B connects: roster gains B with B's display name.
        session.apply(ServerEvent::OnlineUsers(vec![ChatUser::new("b", "Bea")]));
        assert_eq!(session.online_users(), vec![ChatUser::new("b", "Bea")]);

        // B says "hi" globally: exactly one entry in the global log.
        session.apply(global_msg("b", "hi"));
        let global = session.conversation(None);
        assert_eq!(global.len(), 1);
        assert_eq!(global[0].sender.uid, "b");

        // We select B and answer privately; the echo lands in B's log only.
        assert!(session.send_message("yo", Some(&ChatUser::new("b", "Bea"))));
        assert_eq!(
            sink.events().last(),
            Some(&ClientEvent::PrivateMessage {
                recipient_id: "b".into(),
                text: "yo".into()
            })
        );
        session.apply(private_msg("me", "b", "yo"));
        assert_eq!(session.conversation(Some("b")).len(), 1);
        assert_eq!(session.conversation(None).len(), 1, "global log unchanged");
    }

    #[test]
    fn typing_signals_move_users_between_scoped_sets() {
        let (session, _) = session();
        session.apply(typing("a", true, false));
        session.apply(typing("b", true, true));
        let snapshot = session.snapshot();
        assert!(snapshot.typing_global.contains("a"));
        assert!(snapshot.typing_private.contains("b"));

        session.apply(typing("a", false, false));
        assert!(session.snapshot().typing_global.is_empty());
    }

    #[test]
    fn typing_line_resolves_names_and_omits_departed_peers() {
        let (session, _) = session();
        session.apply(ServerEvent::OnlineUsers(vec![
            ChatUser::new("a", "ann"),
            ChatUser::new("b", "bob"),
        ]));
        session.apply(typing("a", true, false));
        assert_eq!(session.typing_line(Scope::Global).as_deref(), Some("ann is typing..."));

        session.apply(typing("b", true, false));
        assert_eq!(
            session.typing_line(Scope::Global).as_deref(),
            Some("ann, bob are typing...")
        );

        // "ghost" was never in the roster: typing but unresolvable.
        session.apply(typing("ghost", true, false));
        assert_eq!(
            session.typing_line(Scope::Global).as_deref(),
            Some("ann, bob are typing...")
        );

        // Everyone typing has left: no indicator at all.
        session.apply(ServerEvent::OnlineUsers(vec![]));
        assert_eq!(session.typing_line(Scope::Global), None);
        assert_eq!(session.typing_line(Scope::Private), None);
    }

    #[tokio::test(start_paused = true)]
    async fn attached_session_follows_the_live_connection() {
        use crate::config::SocketConfig;
        use crate::socket::{
            Connector, SharedConnector, TokenProvider, TransportChannels, TransportKind,
        };
        use async_trait::async_trait;
        use blogchat_shared::{AuthPayload, ChatError, Frame};
        use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
        use serde_json::json;

        #[derive(Default)]
        struct PipeConnector {
            server_ends: Mutex<Vec<(UnboundedSender<Frame>, UnboundedReceiver<Frame>)>>,
        }

        #[async_trait]
        impl Connector for PipeConnector {
            async fn connect(
                &self,
                _config: &SocketConfig,
                kind: TransportKind,
                _auth: AuthPayload,
            ) -> Result<TransportChannels, ChatError> {
                let (out_tx, out_rx) = unbounded();
                let (in_tx, in_rx) = unbounded();
                self.server_ends.lock().unwrap().push((in_tx, out_rx));
                Ok(TransportChannels {
                    kind,
                    outgoing: out_tx,
                    incoming: in_rx,
                })
            }
        }

        let connector = Arc::new(PipeConnector::default());
        let connection = SocketConnection::new(
            SocketConfig::default(),
            Arc::clone(&connector) as SharedConnector,
        );
        let session = ChatSession::new(
            ChatUser::new("me", "Me"),
            Arc::new(connection.clone()) as SharedSink,
        );
        session.attach(&connection);

        let tokens: TokenProvider = Arc::new(|| Box::pin(async { None }));
        connection.connect(tokens);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let (to_client, mut from_client) = connector.server_ends.lock().unwrap().remove(0);

        // The identity announcement went out the moment the transport opened.
        let frame = from_client.try_next().unwrap().unwrap();
        assert_eq!(frame.event, names::USER_CONNECT);
        assert_eq!(frame.data, json!({ "username": "Me" }));

        // An inbound roster snapshot lands in session state.
        to_client
            .unbounded_send(Frame::new(
                names::USERS_ONLINE,
                json!([{ "uid": "b", "username": "Bea" }]),
            ))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(session.online_users(), vec![ChatUser::new("b", "Bea")]);

        // And intents reach the wire.
        assert!(session.send_message("hi", None));
        let frame = from_client.try_next().unwrap().unwrap();
        assert_eq!(frame.event, names::CHAT_GLOBAL);
        assert_eq!(frame.data, json!({ "text": "hi" }));
    }

    #[test]
    fn change_listeners_fire_on_transitions_and_can_be_removed() {
        let (session, _) = session();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_l = Arc::clone(&hits);
        let id = session.on_change(move || {
            hits_l.fetch_add(1, Ordering::SeqCst);
        });

        session.apply(global_msg("a", "one"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A rejected send is not a state transition.
        session.send_message("   ", None);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        session.remove_listener(id);
        session.apply(global_msg("a", "two"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
