//! Error types for the sync engine.

use shadowdex_core::CoreError;
use shadowdex_sync_protocol::ProtocolError;
use std::fmt;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during a sync session.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The rendezvous service is unreachable or refused to register a host.
    #[error("signaling error: {0}")]
    Signaling(String),

    /// A guest could not reach its host: bad id, unknown id, unreachable
    /// host or timeout.
    #[error("connection error: {0}")]
    Connection(String),

    /// The established session failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(String),

    /// Reading or merging into the local store failed.
    #[error("storage error: {0}")]
    Storage(#[from] CoreError),

    /// Operation not allowed in the current state.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// The session was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

/// Error category, kept in [`crate::SyncState::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncErrorKind {
    /// See [`SyncError::Signaling`].
    Signaling,
    /// See [`SyncError::Connection`].
    Connection,
    /// See [`SyncError::Transport`].
    Transport,
    /// See [`SyncError::Payload`].
    Payload,
    /// See [`SyncError::Storage`].
    Storage,
    /// See [`SyncError::InvalidStateTransition`].
    InvalidState,
    /// See [`SyncError::Cancelled`].
    Cancelled,
}

impl SyncError {
    /// Creates a signaling error.
    pub fn signaling(message: impl fmt::Display) -> Self {
        Self::Signaling(message.to_string())
    }

    /// Creates a connection error.
    pub fn connection(message: impl fmt::Display) -> Self {
        Self::Connection(message.to_string())
    }

    /// Creates a transport error.
    pub fn transport(message: impl fmt::Display) -> Self {
        Self::Transport(message.to_string())
    }

    /// Creates a payload error.
    pub fn payload(message: impl fmt::Display) -> Self {
        Self::Payload(message.to_string())
    }

    /// Returns the category of this error.
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            SyncError::Signaling(_) => SyncErrorKind::Signaling,
            SyncError::Connection(_) => SyncErrorKind::Connection,
            SyncError::Transport(_) => SyncErrorKind::Transport,
            SyncError::Payload(_) => SyncErrorKind::Payload,
            SyncError::Storage(_) => SyncErrorKind::Storage,
            SyncError::InvalidStateTransition { .. } => SyncErrorKind::InvalidState,
            SyncError::Cancelled => SyncErrorKind::Cancelled,
        }
    }

    /// Returns the message without the category prefix.
    pub fn detail(&self) -> String {
        match self {
            SyncError::Signaling(m)
            | SyncError::Connection(m)
            | SyncError::Transport(m)
            | SyncError::Payload(m) => m.clone(),
            SyncError::Storage(e) => e.to_string(),
            other => other.to_string(),
        }
    }

    /// Rebuilds an error from a recorded failure.
    pub(crate) fn from_failure(kind: SyncErrorKind, message: &str) -> Self {
        match kind {
            SyncErrorKind::Signaling => SyncError::Signaling(message.into()),
            SyncErrorKind::Connection => SyncError::Connection(message.into()),
            SyncErrorKind::Transport => SyncError::Transport(message.into()),
            SyncErrorKind::Payload => SyncError::Payload(message.into()),
            SyncErrorKind::Storage => {
                SyncError::Storage(CoreError::transaction_aborted(message))
            }
            SyncErrorKind::InvalidState => SyncError::InvalidStateTransition {
                from: "Error".into(),
                to: message.into(),
            },
            SyncErrorKind::Cancelled => SyncError::Cancelled,
        }
    }
}

impl From<ProtocolError> for SyncError {
    fn from(e: ProtocolError) -> Self {
        SyncError::Payload(e.to_string())
    }
}

impl fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncErrorKind::Signaling => "signaling",
            SyncErrorKind::Connection => "connection",
            SyncErrorKind::Transport => "transport",
            SyncErrorKind::Payload => "payload",
            SyncErrorKind::Storage => "storage",
            SyncErrorKind::InvalidState => "invalid state",
            SyncErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
