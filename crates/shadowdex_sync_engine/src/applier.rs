//! Database-backed merge of remote notes.
//!
//! Merging is last-writer-wins per note id, on `updated_at`:
//!
//! - a note the local store does not have is inserted
//! - a note strictly newer than the local copy replaces it
//! - otherwise the local copy is kept, including on a tie
//!
//! The whole payload is merged in one store transaction.

use crate::error::SyncResult;
use shadowdex_core::{Database, Note};
use std::sync::Arc;
use tracing::debug;

/// What the merge does with one remote note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeAction {
    /// Not present locally.
    Insert,
    /// Remote copy is strictly newer.
    Replace,
    /// Local copy is as new or newer.
    Keep,
}

/// Decides the fate of `remote` given the local copy, if any.
#[must_use]
pub fn decide(local: Option<&Note>, remote: &Note) -> MergeAction {
    match local {
        None => MergeAction::Insert,
        Some(local) if remote.updated_at > local.updated_at => MergeAction::Replace,
        Some(_) => MergeAction::Keep,
    }
}

/// Counts from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Notes inserted.
    pub inserted: usize,
    /// Local notes replaced.
    pub replaced: usize,
    /// Remote notes discarded in favour of the local copy.
    pub kept: usize,
}

impl MergeReport {
    /// Returns the number of notes written.
    pub fn changed(&self) -> usize {
        self.inserted + self.replaced
    }
}

/// Reads and merges notes on behalf of the sync engine.
///
/// # Example
///
/// ```rust
/// use shadowdex_core::{Database, NoteDraft};
/// use shadowdex_sync_engine::DatabaseApplier;
/// use std::sync::Arc;
///
/// let local = Arc::new(Database::open_in_memory().unwrap());
/// let remote = Database::open_in_memory().unwrap();
/// remote.create_note(NoteDraft::new("Alice", "人物メモ")).unwrap();
///
/// let applier = DatabaseApplier::new(local.clone());
/// let report = applier.apply_remote_notes(remote.all_notes().unwrap()).unwrap();
/// assert_eq!(report.inserted, 1);
/// assert_eq!(local.note_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseApplier {
    database: Arc<Database>,
}

impl DatabaseApplier {
    /// Creates an applier over `database`.
    pub fn new(database: Arc<Database>) -> Self {
        Self { database }
    }

    /// Gets the underlying database.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    /// Reads every local note.
    pub fn snapshot_notes(&self) -> SyncResult<Vec<Note>> {
        Ok(self.database.all_notes()?)
    }

    /// Merges remote notes in a single transaction.
    ///
    /// If the payload names the same id twice, each copy is judged against
    /// what the transaction holds so far.
    pub fn apply_remote_notes(&self, entries: Vec<Note>) -> SyncResult<MergeReport> {
        let report = self.database.transaction(|txn| {
            let mut report = MergeReport::default();
            for remote in entries {
                match decide(txn.get_note(&remote.id).as_ref(), &remote) {
                    MergeAction::Insert => {
                        report.inserted += 1;
                        txn.put_note(remote);
                    }
                    MergeAction::Replace => {
                        report.replaced += 1;
                        txn.put_note(remote);
                    }
                    MergeAction::Keep => report.kept += 1,
                }
            }
            Ok(report)
        })?;
        debug!(
            inserted = report.inserted,
            replaced = report.replaced,
            kept = report.kept,
            "merged remote notes"
        );
        Ok(report)
    }
}
