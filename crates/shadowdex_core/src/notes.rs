//! Note operations on [`Database`].

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::model::{Note, NoteDraft, NoteFilter, NoteId};
use crate::types::{now_millis, Timestamp};
use tracing::debug;

impl Database {
    /// Creates a note with a fresh id and `created_at = updated_at = now`.
    pub fn create_note(&self, draft: NoteDraft) -> CoreResult<Note> {
        let note = Note::from_draft(NoteId::new(), draft, now_millis());
        self.put_note(note.clone())?;
        debug!(id = %note.id, "created note");
        Ok(note)
    }

    /// Replaces the editable fields of a note and bumps `updated_at`.
    ///
    /// `updated_at` becomes `max(now, previous + 1)` so an edit is always
    /// strictly newer than what it replaces, even with a clock behind it.
    pub fn update_note(&self, id: &NoteId, draft: NoteDraft) -> CoreResult<Note> {
        self.transaction(|txn| {
            let previous = txn.get_note(id).ok_or_else(|| CoreError::NoteNotFound {
                id: id.to_string(),
            })?;
            let note = Note {
                title: draft.title,
                category: draft.category,
                tags: draft.tags,
                content: draft.content,
                updated_at: next_timestamp(previous.updated_at),
                ..previous
            };
            txn.put_note(note.clone());
            Ok(note)
        })
    }

    /// Deletes a note from this device only.
    ///
    /// There are no tombstones: a peer still holding the note will bring it
    /// back on the next sync.
    pub fn delete_note(&self, id: &NoteId) -> CoreResult<()> {
        self.transaction(|txn| {
            if txn.get_note(id).is_none() {
                return Err(CoreError::NoteNotFound { id: id.to_string() });
            }
            txn.delete_note(id);
            Ok(())
        })?;
        debug!(%id, "deleted note");
        Ok(())
    }

    /// Inserts or replaces a note verbatim.
    pub fn put_note(&self, note: Note) -> CoreResult<()> {
        self.transaction(|txn| {
            txn.put_note(note);
            Ok(())
        })
    }

    /// Gets a note by id.
    pub fn get_note(&self, id: &NoteId) -> CoreResult<Option<Note>> {
        Ok(self.read(|state| state.notes.get(id).cloned()))
    }

    /// Returns every note, in id order.
    pub fn all_notes(&self) -> CoreResult<Vec<Note>> {
        Ok(self.read(|state| state.notes.values().cloned().collect()))
    }

    /// Returns notes passing `filter`, most recently updated first.
    pub fn list_notes(&self, filter: &NoteFilter) -> CoreResult<Vec<Note>> {
        let mut notes: Vec<Note> = self.read(|state| {
            state
                .notes
                .values()
                .filter(|n| filter.accepts(n))
                .cloned()
                .collect()
        });
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    /// Returns the number of notes.
    #[must_use]
    pub fn note_count(&self) -> usize {
        self.read(|state| state.notes.len())
    }
}

pub(crate) fn next_timestamp(previous: Timestamp) -> Timestamp {
    now_millis().max(previous.saturating_add(1))
}
