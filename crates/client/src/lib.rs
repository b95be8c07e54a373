//! Realtime client for the blogchat backend.
//!
//! The crate is split along the lines the backend draws: a shared
//! [`socket::SocketConnection`] that owns transport negotiation,
//! authentication, and reconnection; a [`session::ChatSession`] holding
//! presence, message logs, and typing state; and [`rooms::CommentRoom`] for
//! live per-post comment threads. Everything compiles for both native and
//! `wasm32` targets; the `runtime` and `logging` modules absorb the
//! differences.

pub mod config;
pub mod identity;
pub mod logging;
pub mod rooms;
pub mod session;
pub mod socket;

mod runtime;
mod timer;

pub use blogchat_shared as shared;
pub use rooms::CommentRoom;
pub use session::{ChatSession, SessionSnapshot};
pub use socket::{ConnectionState, SocketConnection};
