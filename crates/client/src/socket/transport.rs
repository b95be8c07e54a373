//! Transport seam between the connection loop and the wire.
//!
//! A live transport is represented by its channel ends: the connection pushes
//! outbound [`Frame`]s into `outgoing` and drains inbound frames from
//! `incoming`. Each concrete transport owns its own pump tasks behind those
//! channels. The closing contract is symmetric: dropping the `outgoing`
//! sender closes the transport, and `incoming` ends once the transport is
//! closed from either side.
//!
//! Connection establishment goes through the [`Connector`] trait so tests can
//! substitute a fake wire for the real websocket/polling stack.

use async_trait::async_trait;
use blogchat_shared::{AuthPayload, ChatError, Frame};
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::config::SocketConfig;

mod polling;
#[cfg(not(target_arch = "wasm32"))]
mod ws_native;
#[cfg(target_arch = "wasm32")]
mod ws_wasm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Persistent bidirectional websocket, the preferred transport.
    WebSocket,
    /// HTTP long-polling fallback.
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel ends of an established transport.
pub struct TransportChannels {
    pub kind: TransportKind,
    pub outgoing: UnboundedSender<Frame>,
    pub incoming: UnboundedReceiver<Frame>,
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Connector {
    /// Negotiate one transport of the requested kind, presenting `auth`
    /// during the handshake.
    async fn connect(
        &self,
        config: &SocketConfig,
        kind: TransportKind,
        auth: AuthPayload,
    ) -> Result<TransportChannels, ChatError>;
}

#[cfg(not(target_arch = "wasm32"))]
pub type SharedConnector = std::sync::Arc<dyn Connector + Send + Sync>;
#[cfg(target_arch = "wasm32")]
pub type SharedConnector = std::sync::Arc<dyn Connector>;

/// The production connector: real websocket and polling transports.
#[derive(Default)]
pub struct DefaultConnector;

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Connector for DefaultConnector {
    async fn connect(
        &self,
        config: &SocketConfig,
        kind: TransportKind,
        auth: AuthPayload,
    ) -> Result<TransportChannels, ChatError> {
        match kind {
            #[cfg(not(target_arch = "wasm32"))]
            TransportKind::WebSocket => ws_native::connect(config, auth).await,
            #[cfg(target_arch = "wasm32")]
            TransportKind::WebSocket => ws_wasm::connect(config, auth).await,
            TransportKind::Polling => polling::connect(config, auth).await,
        }
    }
}
