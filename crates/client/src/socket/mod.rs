//! Socket layer: the single shared connection to the chat backend.
//!
//! # Architecture
//!
//! ```text
//!  intents (send, typing, rooms)          inbound server events
//!              │                                   ▲
//!              ▼                                   │
//!   ┌────────────────────┐    frames    ┌──────────────────────┐
//!   │  SocketConnection  │─────────────▶│      Dispatcher      │
//!   │  (connect loop,    │              │ (per-event fan-out)  │
//!   │   reconnect policy)│              └──────────────────────┘
//!   └────────────────────┘
//!              │ Connector
//!              ▼
//!   websocket │ polling (sticky fallback)
//! ```
//!
//! One `SocketConnection` is shared by every feature: presence, global chat,
//! private chat, and per-post comment rooms. Each feature registers its own
//! dispatcher subscriptions instead of owning a listener slot, so nobody can
//! clobber anybody else's registration.

mod connection;
mod dispatcher;
mod policy;
mod transport;

pub use connection::{ConnectionState, SocketConnection, TokenFuture, TokenProvider};
pub use dispatcher::{Dispatcher, Subscription};
pub use policy::{ReconnectPolicy, RetryDecision};
pub use transport::{Connector, DefaultConnector, SharedConnector, TransportChannels, TransportKind};
