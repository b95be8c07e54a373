//! The single logical connection to the chat backend.
//!
//! [`SocketConnection`] owns at most one live transport at a time. `connect`
//! tears down whatever came before it, fetches a fresh bearer token, and
//! starts an asynchronous connect/reconnect loop; the caller is never blocked
//! past initiation and never sees a connection failure as an error; failures
//! travel through the `connect_error` event and the observable
//! [`ConnectionState`].
//!
//! `publish` is fire-and-forget and silently drops while disconnected. The
//! rest of the client is written against that: an absent connection is a
//! displayable state, not a fault.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use blogchat_shared::protocol::names;
use blogchat_shared::{AuthPayload, ChatError, Frame};
use futures_util::StreamExt;
use serde_json::{json, Value};

use super::dispatcher::{Dispatcher, Subscription};
use super::policy::{ReconnectPolicy, RetryDecision};
use super::transport::SharedConnector;
use crate::config::SocketConfig;
use crate::runtime;
use crate::{log_debug, log_info, log_warn};

#[cfg(not(target_arch = "wasm32"))]
pub type TokenFuture = futures_util::future::BoxFuture<'static, Option<String>>;
#[cfg(target_arch = "wasm32")]
pub type TokenFuture = futures_util::future::LocalBoxFuture<'static, Option<String>>;

/// Called once per connection attempt; `None` degrades the attempt to an
/// unauthenticated (guest) handshake.
#[cfg(not(target_arch = "wasm32"))]
pub type TokenProvider = Arc<dyn Fn() -> TokenFuture + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub type TokenProvider = Arc<dyn Fn() -> TokenFuture>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

struct ConnInner {
    config: SocketConfig,
    connector: SharedConnector,
    dispatcher: Dispatcher,
    state: Mutex<ConnectionState>,
    /// Sender into the live transport, tagged with the generation that
    /// installed it so a stale loop cannot clear its successor's.
    outbound: Mutex<Option<(u64, futures_channel::mpsc::UnboundedSender<Frame>)>>,
    /// Bumped on every connect/disconnect; a loop whose generation is stale
    /// stops touching shared state.
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct SocketConnection {
    inner: Arc<ConnInner>,
}

impl SocketConnection {
    pub fn new(config: SocketConfig, connector: SharedConnector) -> Self {
        Self {
            inner: Arc::new(ConnInner {
                config,
                connector,
                dispatcher: Dispatcher::new(),
                state: Mutex::new(ConnectionState::Disconnected),
                outbound: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Tear down any existing connection and start a new connect loop with a
    /// fresh token. Returns immediately; progress is observable through
    /// `state()` and the lifecycle events.
    pub fn connect(&self, tokens: TokenProvider) {
        self.disconnect();
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        runtime::spawn(run_loop(Arc::clone(&self.inner), tokens, generation));
    }

    /// Close the transport and stop reconnecting. Idempotent.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        // Dropping the sender closes the transport, which in turn ends the
        // now-stale loop's incoming stream.
        self.inner
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .take();
        let was_connected = {
            let mut state = self.inner.state.lock().expect("state lock poisoned");
            let was = state.is_connected();
            *state = ConnectionState::Disconnected;
            was
        };
        if was_connected {
            self.inner.dispatcher.dispatch(names::DISCONNECT, &Value::Null);
        }
    }

    /// Fire-and-forget send. Dropped silently while no transport is live.
    pub fn publish(&self, event: &str, data: Value) {
        let outbound = self.inner.outbound.lock().expect("outbound lock poisoned");
        match outbound.as_ref() {
            Some((_, sender)) => {
                if sender.unbounded_send(Frame::new(event, data)).is_err() {
                    log_debug!("dropping {}: transport is closing", event);
                }
            }
            None => log_debug!("dropping {}: not connected", event),
        }
    }

    /// Register an event handler under a fresh subscriber key.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn subscribe(
        &self,
        event: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.dispatcher.subscribe(event, handler)
    }

    #[cfg(target_arch = "wasm32")]
    pub fn subscribe(&self, event: &str, handler: impl Fn(&Value) + 'static) -> Subscription {
        self.inner.dispatcher.subscribe(event, handler)
    }

    /// Register under an explicit key; re-registering the same key replaces.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn subscribe_keyed(
        &self,
        event: &str,
        key: &str,
        handler: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.dispatcher.subscribe_keyed(event, key, handler)
    }

    #[cfg(target_arch = "wasm32")]
    pub fn subscribe_keyed(
        &self,
        event: &str,
        key: &str,
        handler: impl Fn(&Value) + 'static,
    ) -> Subscription {
        self.inner.dispatcher.subscribe_keyed(event, key, handler)
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().expect("state lock poisoned").clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }
}

fn set_state(inner: &ConnInner, generation: u64, state: ConnectionState) {
    let mut current = inner.state.lock().expect("state lock poisoned");
    if inner.generation.load(Ordering::SeqCst) == generation {
        *current = state;
    }
}

fn stale(inner: &ConnInner, generation: u64) -> bool {
    inner.generation.load(Ordering::SeqCst) != generation
}

async fn run_loop(inner: Arc<ConnInner>, tokens: TokenProvider, generation: u64) {
    let mut policy = ReconnectPolicy::new(&inner.config);
    loop {
        if stale(&inner, generation) {
            return;
        }
        let token = tokens().await;
        let kind = policy.transport();
        let attempt = policy.attempt();
        set_state(
            &inner,
            generation,
            if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            },
        );
        log_info!(
            "connecting to {} via {} (attempt {})",
            inner.config.url,
            kind,
            attempt + 1
        );

        let outcome = match runtime::timeout(
            inner.config.connect_timeout,
            inner
                .connector
                .connect(&inner.config, kind, AuthPayload { token }),
        )
        .await
        {
            Ok(result) => result,
            Err(()) => Err(ChatError::ConnectTimeout(
                inner.config.connect_timeout.as_millis() as u64,
            )),
        };

        match outcome {
            Ok(channels) => {
                if stale(&inner, generation) {
                    return;
                }
                policy.note_success();
                *inner.outbound.lock().expect("outbound lock poisoned") =
                    Some((generation, channels.outgoing));
                set_state(&inner, generation, ConnectionState::Connected);
                log_info!("socket connected via {}", channels.kind);
                inner.dispatcher.dispatch(names::CONNECT, &Value::Null);

                let mut incoming = channels.incoming;
                while let Some(frame) = incoming.next().await {
                    inner.dispatcher.dispatch(&frame.event, &frame.data);
                }

                // Transport gone; release our sender unless a newer
                // generation already installed its own.
                {
                    let mut outbound = inner.outbound.lock().expect("outbound lock poisoned");
                    if matches!(outbound.as_ref(), Some((g, _)) if *g == generation) {
                        *outbound = None;
                    }
                }
                if stale(&inner, generation) {
                    // Deliberate teardown; disconnect() already told everyone.
                    return;
                }
                log_info!("socket to {} closed", inner.config.url);
                set_state(&inner, generation, ConnectionState::Disconnected);
                inner.dispatcher.dispatch(names::DISCONNECT, &Value::Null);
                if !inner.config.reconnection {
                    return;
                }
                runtime::sleep(inner.config.reconnection_delay).await;
            }
            Err(err) => {
                log_warn!("socket connect_error via {}: {}", kind, err);
                inner
                    .dispatcher
                    .dispatch(names::CONNECT_ERROR, &json!({ "message": err.to_string() }));
                match policy.note_failure(kind) {
                    RetryDecision::Retry { delay } => runtime::sleep(delay).await,
                    RetryDecision::GiveUp => {
                        log_warn!("giving up on {}: {}", inner.config.url, err);
                        set_state(
                            &inner,
                            generation,
                            ConnectionState::Failed {
                                reason: err.to_string(),
                            },
                        );
                        return;
                    }
                }
            }
        }
    }
}
