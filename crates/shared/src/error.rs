//! Error taxonomy for the realtime client.
//!
//! Transport and authentication failures are retried or degraded, never
//! fatal: they travel through the `connect_error` event and the observable
//! connection state rather than being raised at call sites.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport-level failure: negotiation refused, socket error, remote
    /// endpoint unreachable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote endpoint did not complete the handshake in time.
    #[error("connection timed out after {0}ms")]
    ConnectTimeout(u64),

    /// A frame could not be encoded or decoded.
    #[error("malformed frame: {0}")]
    Codec(#[from] serde_json::Error),

    /// The configured endpoint URL is not usable.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}
