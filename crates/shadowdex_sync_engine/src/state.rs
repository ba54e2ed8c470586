//! Sync engine state machine.
//!
//! ```text
//! Idle ──▶ Generating ──▶ Waiting ───┐
//!  │                                 ├──▶ Syncing ──▶ Success
//!  └─────▶ Connecting ───────────────┘
//! ```
//!
//! Any in-flight state may fall to `Error`. `Success` and `Error` reset to
//! `Idle`, and a new session may also start straight from `Error`.
//!
//! Every transition goes through [`SyncPhase::can_transition_to`].

use crate::error::SyncErrorKind;
use shadowdex_sync_protocol::RendezvousId;
use std::fmt;

/// Which side of a session this engine is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncRole {
    /// Created the rendezvous id and waited.
    Host,
    /// Joined with a scanned id.
    Guest,
}

/// Outcome of a successful session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Role played.
    pub role: SyncRole,
    /// Notes sent to the peer.
    pub sent: usize,
    /// Remote notes that were new here.
    pub inserted: usize,
    /// Local notes replaced by newer remote copies.
    pub replaced: usize,
    /// Remote notes not newer than the local copy.
    pub kept: usize,
    /// Inbound messages skipped because they were not understood.
    pub ignored_messages: usize,
}

/// Observable state of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No session.
    Idle,
    /// Host is obtaining a rendezvous id.
    Generating,
    /// Host is waiting for a guest to join with `rendezvous_id`.
    Waiting {
        /// The id to show to the other device.
        rendezvous_id: RendezvousId,
    },
    /// Guest is reaching its host.
    Connecting,
    /// Both sides are exchanging and merging notes.
    Syncing,
    /// The session completed.
    Success(SyncReport),
    /// The session failed.
    Error {
        /// Category of the failure.
        kind: SyncErrorKind,
        /// Human-readable description.
        message: String,
    },
}

/// Data-free discriminant of [`SyncState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    /// See [`SyncState::Idle`].
    Idle,
    /// See [`SyncState::Generating`].
    Generating,
    /// See [`SyncState::Waiting`].
    Waiting,
    /// See [`SyncState::Connecting`].
    Connecting,
    /// See [`SyncState::Syncing`].
    Syncing,
    /// See [`SyncState::Success`].
    Success,
    /// See [`SyncState::Error`].
    Error,
}

impl SyncPhase {
    /// Returns true if a session is in flight.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncPhase::Generating | SyncPhase::Waiting | SyncPhase::Connecting | SyncPhase::Syncing
        )
    }

    /// Returns true if the session has ended.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Success | SyncPhase::Error)
    }

    /// Returns true if a new session may start.
    pub fn can_start_sync(&self) -> bool {
        matches!(self, SyncPhase::Idle | SyncPhase::Error)
    }

    /// Returns true if the state machine allows `self -> next`.
    pub fn can_transition_to(&self, next: SyncPhase) -> bool {
        use SyncPhase::*;
        match (self, next) {
            (Idle | Error, Generating | Connecting) => true,
            (Generating, Waiting) => true,
            (Waiting | Connecting, Syncing) => true,
            (Syncing, Success) => true,
            (Generating | Waiting | Connecting | Syncing, Error) => true,
            (Success | Error, Idle) => true,
            _ => false,
        }
    }
}

impl SyncState {
    /// Returns the phase of this state.
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncState::Idle => SyncPhase::Idle,
            SyncState::Generating => SyncPhase::Generating,
            SyncState::Waiting { .. } => SyncPhase::Waiting,
            SyncState::Connecting => SyncPhase::Connecting,
            SyncState::Syncing => SyncPhase::Syncing,
            SyncState::Success(_) => SyncPhase::Success,
            SyncState::Error { .. } => SyncPhase::Error,
        }
    }

    /// Returns true if a session is in flight.
    pub fn is_active(&self) -> bool {
        self.phase().is_active()
    }

    /// Returns true if the session has ended.
    pub fn is_terminal(&self) -> bool {
        self.phase().is_terminal()
    }

    /// Returns the rendezvous id while waiting for a guest.
    pub fn rendezvous_id(&self) -> Option<&RendezvousId> {
        match self {
            SyncState::Waiting { rendezvous_id } => Some(rendezvous_id),
            _ => None,
        }
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncPhase::Idle => "Idle",
            SyncPhase::Generating => "Generating",
            SyncPhase::Waiting => "Waiting",
            SyncPhase::Connecting => "Connecting",
            SyncPhase::Syncing => "Syncing",
            SyncPhase::Success => "Success",
            SyncPhase::Error => "Error",
        };
        f.write_str(name)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Waiting { rendezvous_id } => write!(f, "Waiting ({rendezvous_id})"),
            SyncState::Success(report) => write!(
                f,
                "Success (sent {}, inserted {}, replaced {}, kept {})",
                report.sent, report.inserted, report.replaced, report.kept
            ),
            SyncState::Error { kind, message } => write!(f, "Error ({kind}: {message})"),
            other => write!(f, "{}", other.phase()),
        }
    }
}
