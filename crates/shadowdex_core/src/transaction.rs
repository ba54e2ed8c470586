//! Write transactions.

use crate::model::{Category, CategoryId, Note, NoteId};
use crate::snapshot::StoreState;
use std::collections::BTreeMap;

/// A pending write in a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingWrite<T> {
    /// Insert or replace a record.
    Put(T),
    /// Remove a record.
    Delete,
}

impl<T> PendingWrite<T> {
    fn as_record(&self) -> Option<&T> {
        match self {
            Self::Put(record) => Some(record),
            Self::Delete => None,
        }
    }
}

/// An open write transaction.
///
/// Reads see the committed state overlaid with this transaction's own
/// pending writes. Nothing is visible to other readers until the closure
/// passed to [`crate::Database::transaction`] returns `Ok`.
#[derive(Debug)]
pub struct Transaction<'a> {
    base: &'a StoreState,
    notes: BTreeMap<NoteId, PendingWrite<Note>>,
    categories: BTreeMap<CategoryId, PendingWrite<Category>>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(base: &'a StoreState) -> Self {
        Self {
            base,
            notes: BTreeMap::new(),
            categories: BTreeMap::new(),
        }
    }

    /// Gets a note by id.
    #[must_use]
    pub fn get_note(&self, id: &NoteId) -> Option<Note> {
        match self.notes.get(id) {
            Some(write) => write.as_record().cloned(),
            None => self.base.notes.get(id).cloned(),
        }
    }

    /// Inserts or replaces a note.
    pub fn put_note(&mut self, note: Note) {
        self.notes.insert(note.id.clone(), PendingWrite::Put(note));
    }

    /// Deletes a note. Deleting an absent note is a no-op.
    pub fn delete_note(&mut self, id: &NoteId) {
        self.notes.insert(id.clone(), PendingWrite::Delete);
    }

    /// Returns every note visible to this transaction.
    #[must_use]
    pub fn notes(&self) -> Vec<Note> {
        overlay(&self.base.notes, &self.notes)
    }

    /// Gets a category by id.
    #[must_use]
    pub fn get_category(&self, id: &CategoryId) -> Option<Category> {
        match self.categories.get(id) {
            Some(write) => write.as_record().cloned(),
            None => self.base.categories.get(id).cloned(),
        }
    }

    /// Inserts or replaces a category.
    pub fn put_category(&mut self, category: Category) {
        self.categories
            .insert(category.id.clone(), PendingWrite::Put(category));
    }

    /// Deletes a category.
    pub fn delete_category(&mut self, id: &CategoryId) {
        self.categories.insert(id.clone(), PendingWrite::Delete);
    }

    /// Returns every category visible to this transaction, unsorted.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        overlay(&self.base.categories, &self.categories)
    }

    /// Returns the number of pending writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.notes.len() + self.categories.len()
    }

    /// Applies the pending writes onto `state`.
    pub(crate) fn apply_to(self, state: &mut StoreState) {
        apply(&mut state.notes, self.notes);
        apply(&mut state.categories, self.categories);
    }
}

fn overlay<K: Ord + Clone, T: Clone>(
    base: &BTreeMap<K, T>,
    writes: &BTreeMap<K, PendingWrite<T>>,
) -> Vec<T> {
    let mut merged = base.clone();
    apply(&mut merged, writes.clone());
    merged.into_values().collect()
}

fn apply<K: Ord, T>(target: &mut BTreeMap<K, T>, writes: BTreeMap<K, PendingWrite<T>>) {
    for (key, write) in writes {
        match write {
            PendingWrite::Put(record) => {
                target.insert(key, record);
            }
            PendingWrite::Delete => {
                target.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NoteDraft;

    fn note(id: &str, title: &str) -> Note {
        Note::from_draft(NoteId::from(id), NoteDraft::new(title, "c"), 1)
    }

    fn base() -> StoreState {
        let mut state = StoreState::default();
        state.notes.insert(NoteId::from("a"), note("a", "committed"));
        state
    }

    #[test]
    fn reads_see_own_writes() {
        let state = base();
        let mut txn = Transaction::new(&state);

        txn.put_note(note("b", "pending"));
        assert_eq!(txn.get_note(&NoteId::from("b")).unwrap().title, "pending");
        assert_eq!(txn.notes().len(), 2);

        txn.delete_note(&NoteId::from("a"));
        assert!(txn.get_note(&NoteId::from("a")).is_none());
        assert_eq!(txn.notes().len(), 1);
        assert_eq!(txn.write_count(), 2);
    }

    #[test]
    fn base_is_untouched_until_applied() {
        let state = base();
        let mut txn = Transaction::new(&state);
        txn.put_note(note("a", "changed"));
        assert_eq!(state.notes[&NoteId::from("a")].title, "committed");

        let mut next = state.clone();
        txn.apply_to(&mut next);
        assert_eq!(next.notes[&NoteId::from("a")].title, "changed");
    }

    #[test]
    fn last_write_to_a_key_wins() {
        let state = base();
        let mut txn = Transaction::new(&state);
        txn.delete_note(&NoteId::from("a"));
        txn.put_note(note("a", "again"));
        assert_eq!(txn.get_note(&NoteId::from("a")).unwrap().title, "again");
        assert_eq!(txn.write_count(), 1);
    }
}
