//! # ShadowDex Sync Engine
//!
//! Peer-to-peer sync for ShadowDex.
//!
//! This crate provides:
//! - Sync state machine (idle → generating/connecting → syncing → success)
//! - Transport abstraction with TCP and in-memory implementations
//! - Session encryption keyed by the rendezvous id
//! - Last-writer-wins merge into the local store
//!
//! ## Architecture
//!
//! Two devices sync by **full-collection exchange**:
//! 1. The host publishes a rendezvous id; the guest joins with it
//! 2. Each side sends its entire note collection as one `SYNC_DATA` payload
//! 3. Each side merges what it receives in a single store transaction
//!
//! The engine talks to its session only through tokio channels. Transports
//! run the I/O on their own tasks.
//!
//! ## Key Invariants
//!
//! - One session per engine; a new one starts only from `Idle` or `Error`
//! - A note is replaced only by a strictly newer copy
//! - The merge is all-or-nothing
//! - A session is closed exactly once
//! - Deletes do not propagate

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
pub mod cipher;
mod config;
mod engine;
mod error;
mod memory;
mod state;
mod tcp;
mod transport;

pub use applier::{decide, DatabaseApplier, MergeAction, MergeReport};
pub use config::SyncConfig;
pub use engine::{SyncEngine, SyncStats};
pub use error::{SyncError, SyncErrorKind, SyncResult};
pub use memory::{MemoryHub, MemoryListener, MemoryTransport};
pub use state::{SyncPhase, SyncReport, SyncRole, SyncState};
pub use tcp::{TcpSessionListener, TcpTransport, TcpTransportConfig};
pub use transport::{
    ClosedSignal, Outbound, Session, SessionCloser, SessionEvent, SessionIo,
    SessionListener, SessionSender, Transport, DEFAULT_CHANNEL_CAPACITY,
};
