//! Note commands.

use super::CliResult;
use shadowdex_core::{CoreError, Database, Note, NoteDraft, NoteFilter, NoteId};
use tracing::info;

/// Fields to change on an existing note.
#[derive(Debug, Default)]
pub struct NoteEdit {
    /// New title.
    pub title: Option<String>,
    /// New category name.
    pub category: Option<String>,
    /// Replacement tags.
    pub tags: Option<Vec<String>>,
    /// New body.
    pub content: Option<String>,
}

impl NoteEdit {
    fn apply(self, note: &Note) -> NoteDraft {
        let mut draft = NoteDraft::from(note);
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(category) = self.category {
            draft.category = category;
        }
        if let Some(tags) = self.tags {
            draft.tags = tags;
        }
        if let Some(content) = self.content {
            draft.content = content;
        }
        draft
    }
}

/// Adds a note and prints its id.
pub fn add(
    db: &Database,
    title: String,
    category: String,
    tags: Vec<String>,
    content: String,
) -> CliResult<()> {
    let draft = NoteDraft::new(title, category)
        .with_tags(tags)
        .with_content(content);
    let note = db.create_note(draft)?;
    info!(id = %note.id, "note created");
    println!("{}", note.id);
    Ok(())
}

/// Edits a note.
pub fn edit(db: &Database, id: &str, edit: NoteEdit) -> CliResult<Note> {
    let id = NoteId::from(id);
    let current = db
        .get_note(&id)?
        .ok_or_else(|| CoreError::NoteNotFound { id: id.to_string() })?;
    let note = db.update_note(&id, edit.apply(&current))?;
    println!("Updated {}", note.id);
    Ok(note)
}

/// Deletes a note from this device.
pub fn delete(db: &Database, id: &str) -> CliResult<()> {
    db.delete_note(&NoteId::from(id))?;
    println!("Deleted {id}");
    Ok(())
}

/// Lists notes.
pub fn list(
    db: &Database,
    category: Option<String>,
    query: Option<String>,
    json: bool,
) -> CliResult<()> {
    let filter = NoteFilter { category, query };
    let notes = db.list_notes(&filter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&notes)?);
        return Ok(());
    }

    if notes.is_empty() {
        println!("No notes.");
    }
    for note in &notes {
        println!("{}  [{}] {}", note.id, note.category, note.title);
        if !note.tags.is_empty() {
            println!("    tags: {}", note.tags.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edit_changes_only_given_fields() {
        let db = Database::open_in_memory().unwrap();
        let note = db
            .create_note(
                NoteDraft::new("Alice", "人物メモ")
                    .with_tags(["team"])
                    .with_content("PM"),
            )
            .unwrap();

        let edited = edit(
            &db,
            note.id.as_str(),
            NoteEdit {
                content: Some("Lead".into()),
                ..NoteEdit::default()
            },
        )
        .unwrap();

        assert_eq!(edited.title, "Alice");
        assert_eq!(edited.category, "人物メモ");
        assert_eq!(edited.tags, vec!["team".to_string()]);
        assert_eq!(edited.content, "Lead");
        assert!(edited.updated_at > note.updated_at);
    }

    #[test]
    fn editing_a_missing_note_fails() {
        let db = Database::open_in_memory().unwrap();
        assert!(edit(&db, "missing", NoteEdit::default()).is_err());
        assert!(delete(&db, "missing").is_err());
    }
}
