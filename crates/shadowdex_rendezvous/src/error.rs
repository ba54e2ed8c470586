//! Error types for the rendezvous service and client.

use shadowdex_sync_protocol::ProtocolError;
use thiserror::Error;

/// Result type for rendezvous operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur talking to or running the rendezvous service.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The service refused the request.
    #[error("rejected by rendezvous service: {0}")]
    Rejected(String),

    /// The peer answered with something other than what was asked for.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// No answer in time.
    #[error("rendezvous request timed out")]
    Timeout,

    /// The connection closed mid-exchange.
    #[error("rendezvous connection closed")]
    ConnectionClosed,

    /// Malformed frame or message.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if this is the client's fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_) | ServerError::Protocol(_)
        )
    }
}
