//! Transport configuration.

use std::time::Duration;

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Capacity of the receive byte queue in bytes.
    pub queue_capacity: usize,
    /// How long a client read blocks waiting for queued bytes.
    pub recv_timeout: Duration,
    /// How long the inbound dispatcher waits for queue space.
    pub push_timeout: Duration,
    /// Maximum topic filters accepted in one SUBSCRIBE/UNSUBSCRIBE packet.
    pub max_filters_per_packet: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            recv_timeout: Duration::from_secs(5),
            push_timeout: Duration::from_secs(5),
            max_filters_per_packet: 8,
        }
    }
}

impl TransportConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receive queue capacity in bytes.
    pub fn queue_capacity(mut self, bytes: usize) -> Self {
        self.queue_capacity = bytes;
        self
    }

    /// Set the blocking read timeout.
    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    /// Set the queue push timeout.
    pub fn push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = timeout;
        self
    }

    /// Set the per-packet topic filter capacity.
    pub fn max_filters_per_packet(mut self, max: usize) -> Self {
        self.max_filters_per_packet = max;
        self
    }
}
