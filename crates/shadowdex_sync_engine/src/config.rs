//! Configuration for the sync engine.

use shadowdex_sync_protocol::DEFAULT_MAX_PAYLOAD_BYTES;
use std::time::Duration;

/// Configuration for sync sessions.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a guest may take to reach its host.
    pub connect_timeout: Duration,
    /// How long a session stays open after success before it is closed.
    pub linger: Duration,
    /// Largest payload sent or accepted.
    pub max_payload_bytes: usize,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            linger: Duration::from_millis(1500),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    /// Sets the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the linger delay.
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Sets the payload size limit.
    pub fn with_max_payload_bytes(mut self, max: usize) -> Self {
        self.max_payload_bytes = max;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}
