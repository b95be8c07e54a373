//! Socket endpoint configuration.
//!
//! The endpoint URL comes from the environment with a hardcoded remote
//! fallback; the remaining options mirror the connection contract the chat
//! backend expects (transport preference, bounded reconnection with a fixed
//! delay, and a generous handshake timeout for slow-starting hosts).

use std::time::Duration;

use blogchat_shared::ChatError;
use url::Url;

use crate::socket::TransportKind;

/// Environment variable holding the chat backend URL.
pub const SOCKET_URL_ENV: &str = "BLOGCHAT_SOCKET_URL";

/// Default chat backend when no environment override is present.
pub const DEFAULT_SOCKET_URL: &str = "https://blogchatglobalbackend.onrender.com/";

#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Base HTTP(S) URL of the chat backend.
    pub url: String,
    /// Transport preference, tried in order.
    pub transports: Vec<TransportKind>,
    /// Part of the connection contract the backend advertises. The frame
    /// protocol itself carries credentials in the auth frame, so no
    /// transport consults this today.
    pub with_credentials: bool,
    /// Reconnect automatically after a drop or a failed attempt.
    pub reconnection: bool,
    /// Bounded attempt count before giving up for the session.
    pub reconnection_attempts: u32,
    /// Fixed delay between attempts.
    pub reconnection_delay: Duration,
    /// Handshake timeout. The default backend sleeps when idle and can take
    /// a long time to accept its first connection.
    pub connect_timeout: Duration,
    /// Consecutive websocket failures before the sticky fallback to polling.
    pub transport_fallback_after: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOCKET_URL.to_string(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            with_credentials: true,
            reconnection: true,
            reconnection_attempts: 10,
            reconnection_delay: Duration::from_millis(2000),
            connect_timeout: Duration::from_millis(20000),
            transport_fallback_after: 3,
        }
    }
}

impl SocketConfig {
    /// Configuration from the environment, falling back to the default
    /// remote backend.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        let url = std::env::var(SOCKET_URL_ENV).unwrap_or_else(|_| DEFAULT_SOCKET_URL.to_string());
        Self {
            url,
            ..Self::default()
        }
    }

    /// WASM builds cannot read a process environment at runtime, so the
    /// override is baked in at compile time.
    #[cfg(target_arch = "wasm32")]
    pub fn from_env() -> Self {
        let url = option_env!("BLOGCHAT_SOCKET_URL").unwrap_or(DEFAULT_SOCKET_URL);
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    fn base_url(&self) -> Result<Url, ChatError> {
        Url::parse(&self.url).map_err(|e| ChatError::InvalidEndpoint(e.to_string()))
    }

    /// The websocket endpoint, with the scheme swapped to ws/wss.
    pub fn websocket_url(&self) -> Result<Url, ChatError> {
        let mut url = self
            .base_url()?
            .join("ws")
            .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| ChatError::InvalidEndpoint(format!("cannot set scheme on {}", self.url)))?;
        Ok(url)
    }

    /// The long-polling endpoint root.
    pub fn polling_url(&self) -> Result<Url, ChatError> {
        self.base_url()?
            .join("poll")
            .map_err(|e| ChatError::InvalidEndpoint(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_swaps_the_scheme() {
        let config = SocketConfig {
            url: "https://chat.example.com/".into(),
            ..SocketConfig::default()
        };
        assert_eq!(
            config.websocket_url().unwrap().as_str(),
            "wss://chat.example.com/ws"
        );

        let local = SocketConfig {
            url: "http://localhost:4000/".into(),
            ..SocketConfig::default()
        };
        assert_eq!(
            local.websocket_url().unwrap().as_str(),
            "ws://localhost:4000/ws"
        );
    }

    #[test]
    fn rejects_an_unparseable_endpoint() {
        let config = SocketConfig {
            url: "not a url".into(),
            ..SocketConfig::default()
        };
        assert!(matches!(
            config.websocket_url(),
            Err(ChatError::InvalidEndpoint(_))
        ));
    }
}
