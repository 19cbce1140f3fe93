//! Transport configuration.

use std::time::Duration;

use crate::core::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_DRAIN_LIMIT, DEFAULT_MAX_PACKET_LEN};

/// Settings shared by every transport backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Exclusive upper bound on a declared frame length.
    pub max_packet_len: usize,

    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,

    /// Bound on an out-of-band [`send_packet`](crate::core::Transport::send_packet).
    pub send_timeout: Duration,

    /// Maximum packets moved from the outgoing queue per transport cycle.
    pub drain_limit: usize,

    /// Close the authentication gate on every new connection.
    pub auth_required: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_packet_len: DEFAULT_MAX_PACKET_LEN,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            send_timeout: DEFAULT_CONNECT_TIMEOUT,
            drain_limit: DEFAULT_DRAIN_LIMIT,
            auth_required: false,
        }
    }
}

impl TransportConfig {
    /// Start a builder from the defaults.
    pub fn builder() -> TransportConfigBuilder {
        TransportConfigBuilder::new()
    }
}

/// Builder for [`TransportConfig`].
#[derive(Debug, Clone, Default)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum accepted frame length (exclusive).
    pub fn max_packet_len(mut self, len: usize) -> Self {
        self.config.max_packet_len = len;
        self
    }

    /// Set the connection attempt timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the out-of-band send timeout.
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = timeout;
        self
    }

    /// Set how many queued packets one cycle may move to the socket.
    pub fn drain_limit(mut self, limit: usize) -> Self {
        self.config.drain_limit = limit.max(1);
        self
    }

    /// Require an authentication exchange before application traffic.
    pub fn auth_required(mut self, required: bool) -> Self {
        self.config.auth_required = required;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TransportConfig {
        self.config
    }
}
