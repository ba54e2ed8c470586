//! Properties of the last-writer-wins merge.

use proptest::prelude::*;
use shadowdex_core::{Database, Note, NoteDraft, NoteId};
use shadowdex_sync_engine::DatabaseApplier;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Notes whose content is a function of `(id, updated_at)`, so two peers
/// never hold different notes under the same id and timestamp.
fn note(id: u8, updated_at: u64) -> Note {
    Note::from_draft(
        NoteId::from(format!("note-{id}")),
        NoteDraft::new(format!("{id}@{updated_at}"), "その他").with_tags([format!("v{updated_at}")]),
        updated_at,
    )
}

fn collection() -> impl Strategy<Value = Vec<Note>> {
    prop::collection::btree_map(0u8..12, 0u64..20, 0..10)
        .prop_map(|m| m.into_iter().map(|(id, at)| note(id, at)).collect())
}

fn applier(notes: &[Note]) -> DatabaseApplier {
    let db = Arc::new(Database::open_in_memory().unwrap());
    for n in notes {
        db.put_note(n.clone()).unwrap();
    }
    DatabaseApplier::new(db)
}

fn by_id(notes: Vec<Note>) -> BTreeMap<NoteId, Note> {
    notes.into_iter().map(|n| (n.id.clone(), n)).collect()
}

proptest! {
    #[test]
    fn peers_converge(a in collection(), b in collection()) {
        let left = applier(&a);
        let right = applier(&b);

        left.apply_remote_notes(b.clone()).unwrap();
        right.apply_remote_notes(a.clone()).unwrap();

        prop_assert_eq!(left.snapshot_notes().unwrap(), right.snapshot_notes().unwrap());
    }

    #[test]
    fn merge_is_idempotent(a in collection(), b in collection()) {
        let local = applier(&a);
        local.apply_remote_notes(b.clone()).unwrap();
        let once = local.snapshot_notes().unwrap();

        let again = local.apply_remote_notes(b.clone()).unwrap();
        prop_assert_eq!(again.changed(), 0);
        prop_assert_eq!(again.kept, b.len());
        prop_assert_eq!(local.snapshot_notes().unwrap(), once);
    }

    #[test]
    fn strictly_newer_wins(a in collection(), b in collection()) {
        let local = applier(&a);
        local.apply_remote_notes(b.clone()).unwrap();
        let merged = by_id(local.snapshot_notes().unwrap());
        let a = by_id(a);
        let b = by_id(b);

        for (id, remote) in &b {
            let expected = match a.get(id) {
                Some(mine) if remote.updated_at <= mine.updated_at => mine,
                _ => remote,
            };
            prop_assert_eq!(merged.get(id), Some(expected));
        }
    }

    #[test]
    fn one_sided_notes_survive(a in collection(), b in collection()) {
        let local = applier(&a);
        local.apply_remote_notes(b.clone()).unwrap();
        let merged = by_id(local.snapshot_notes().unwrap());
        let remote_ids: Vec<NoteId> = b.iter().map(|n| n.id.clone()).collect();

        for mine in a.iter().filter(|n| !remote_ids.contains(&n.id)) {
            prop_assert_eq!(merged.get(&mine.id), Some(mine));
        }
        prop_assert_eq!(merged.len(), by_id(a.into_iter().chain(b).collect()).len());
    }
}

#[test]
fn tie_keeps_local_even_when_content_differs() {
    let mine = Note::from_draft(NoteId::from("x"), NoteDraft::new("mine", "その他"), 100);
    let theirs = Note::from_draft(NoteId::from("x"), NoteDraft::new("theirs", "その他"), 100);

    let local = applier(&[mine.clone()]);
    let report = local.apply_remote_notes(vec![theirs]).unwrap();
    assert_eq!(report.kept, 1);
    assert_eq!(local.snapshot_notes().unwrap(), vec![mine]);
}
