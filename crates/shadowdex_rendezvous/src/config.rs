//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the rendezvous service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Maximum hosts registered at once.
    pub max_registrations: usize,
    /// How long a connection without a registration may stay silent.
    pub request_timeout: Duration,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            max_registrations: 1024,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the maximum number of registrations.
    pub fn with_max_registrations(mut self, max: usize) -> Self {
        self.max_registrations = max;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], 7410)))
    }
}
