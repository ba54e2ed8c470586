//! # ShadowDex Core
//!
//! Local record store for ShadowDex.
//!
//! This crate provides:
//! - The [`Note`] and [`Category`] data model
//! - A single-writer [`Database`] with all-or-nothing transactions
//! - Snapshot persistence through a pluggable [`StorageBackend`]
//! - Forward-only schema migrations
//!
//! ## Key Invariants
//!
//! - A note id is minted once (UUIDv4) and never reassigned
//! - `updated_at` is bumped on every local mutation and never decreases
//! - A transaction either commits every write or none of them
//! - Deleting a note is local only; there are no tombstones
//!
//! ## Example
//!
//! ```rust
//! use shadowdex_core::{Database, NoteDraft};
//!
//! let db = Database::open_in_memory().unwrap();
//! let note = db.create_note(NoteDraft::new("Alice", "人物メモ")).unwrap();
//! assert_eq!(note.created_at, note.updated_at);
//! assert_eq!(db.get_note(&note.id).unwrap(), Some(note));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod categories;
mod config;
mod database;
mod error;
pub mod migration;
mod model;
mod notes;
mod snapshot;
mod transaction;
mod types;

#[cfg(feature = "std")]
pub use backend::FileBackend;
pub use backend::{InMemoryBackend, StorageBackend};
pub use config::Config;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use model::{
    Category, CategoryId, Note, NoteDraft, NoteFilter, NoteId, DEFAULT_CATEGORY_COLOR,
    DEFAULT_ICON, FALLBACK_CATEGORY, PRESET_ICONS,
};
pub use snapshot::Snapshot;
pub use transaction::{PendingWrite, Transaction};
pub use types::{now_millis, Timestamp};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
