//! Reconnection and transport-selection policy.
//!
//! Pure bookkeeping, separated from the connection loop so the schedule is
//! testable without a transport: fixed delay between attempts, a bounded
//! attempt count, and a sticky fallback from websocket to polling once
//! websocket negotiation has failed often enough.

use std::time::Duration;

use super::transport::TransportKind;
use crate::config::SocketConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

#[derive(Debug)]
pub struct ReconnectPolicy {
    enabled: bool,
    max_attempts: u32,
    delay: Duration,
    fallback_after: u32,
    transports: Vec<TransportKind>,
    attempt: u32,
    websocket_failures: u32,
    sticky_polling: bool,
}

impl ReconnectPolicy {
    pub fn new(config: &SocketConfig) -> Self {
        Self {
            enabled: config.reconnection,
            max_attempts: config.reconnection_attempts,
            delay: config.reconnection_delay,
            fallback_after: config.transport_fallback_after,
            transports: config.transports.clone(),
            attempt: 0,
            websocket_failures: 0,
            sticky_polling: false,
        }
    }

    /// Consecutive failed attempts so far (0 on a fresh or recovered
    /// connection).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The transport to try next. Once the fallback has triggered it stays
    /// polling for the rest of the session.
    pub fn transport(&self) -> TransportKind {
        if self.sticky_polling {
            TransportKind::Polling
        } else {
            self.transports
                .first()
                .copied()
                .unwrap_or(TransportKind::Polling)
        }
    }

    /// A connection was established; the attempt counter resets but the
    /// transport fallback, once taken, does not.
    pub fn note_success(&mut self) {
        self.attempt = 0;
        self.websocket_failures = 0;
    }

    pub fn note_failure(&mut self, kind: TransportKind) -> RetryDecision {
        self.attempt += 1;
        if kind == TransportKind::WebSocket {
            self.websocket_failures += 1;
            if self.websocket_failures >= self.fallback_after
                && self.transports.contains(&TransportKind::Polling)
            {
                self.sticky_polling = true;
            }
        }
        if !self.enabled || self.attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry { delay: self.delay }
        }
    }
}
