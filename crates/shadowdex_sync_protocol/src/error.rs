//! Protocol errors.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors produced while parsing or encoding protocol data.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A string is not a rendezvous id.
    #[error("invalid rendezvous id '{id}': {reason}")]
    InvalidRendezvousId {
        /// The rejected input.
        id: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Bytes could not be encoded or decoded.
    #[error("codec error: {message}")]
    Codec {
        /// Description of the failure.
        message: String,
    },

    /// A payload exceeds the configured maximum.
    #[error("payload of {size} bytes exceeds limit of {max} bytes")]
    PayloadTooLarge {
        /// Actual size.
        size: usize,
        /// Allowed size.
        max: usize,
    },
}

impl ProtocolError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_id(id: &str, reason: &'static str) -> Self {
        Self::InvalidRendezvousId {
            id: id.to_string(),
            reason,
        }
    }
}
