//! Note record, the unit exchanged during sync.

use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque note identifier.
///
/// Note IDs are:
/// - Globally unique across every device (freshly minted UUIDv4)
/// - Immutable once assigned
/// - Compared as plain strings, so ids minted elsewhere are accepted as-is
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Mints a new random note ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the id is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoteId({})", self.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NoteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A note.
///
/// Field names serialize in camelCase so payloads stay readable by other
/// ShadowDex clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Stable identifier.
    pub id: NoteId,
    /// Title.
    pub title: String,
    /// Category name (denormalized, not a category id).
    pub category: String,
    /// Ordered tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Free text body.
    #[serde(default)]
    pub content: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last local modification time.
    pub updated_at: Timestamp,
}

impl Note {
    /// Builds a note from a draft with both timestamps set to `now`.
    #[must_use]
    pub fn from_draft(id: NoteId, draft: NoteDraft, now: Timestamp) -> Self {
        Self {
            id,
            title: draft.title,
            category: draft.category,
            tags: draft.tags,
            content: draft.content,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the note matches a case-insensitive query over
    /// title, content and tags.
    #[must_use]
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.title.to_lowercase().contains(&q)
            || self.content.to_lowercase().contains(&q)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&q))
    }
}

/// Editable fields of a note.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    /// Title.
    pub title: String,
    /// Category name.
    pub category: String,
    /// Ordered tags.
    pub tags: Vec<String>,
    /// Body.
    pub content: String,
}

impl NoteDraft {
    /// Creates a draft with a title and category.
    pub fn new(title: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            ..Self::default()
        }
    }

    /// Sets the tags.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }
}

impl From<&Note> for NoteDraft {
    fn from(note: &Note) -> Self {
        Self {
            title: note.title.clone(),
            category: note.category.clone(),
            tags: note.tags.clone(),
            content: note.content.clone(),
        }
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct NoteFilter {
    /// Only notes in this category.
    pub category: Option<String>,
    /// Case-insensitive substring over title, content and tags.
    pub query: Option<String>,
}

impl NoteFilter {
    /// Filter on a category name.
    #[must_use]
    pub fn category(mut self, name: impl Into<String>) -> Self {
        self.category = Some(name.into());
        self
    }

    /// Filter on a search query.
    #[must_use]
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Returns true if the note passes the filter.
    #[must_use]
    pub fn accepts(&self, note: &Note) -> bool {
        if let Some(category) = &self.category {
            if &note.category != category {
                return false;
            }
        }
        match &self.query {
            Some(q) if !q.is_empty() => note.matches_query(q),
            _ => true,
        }
    }
}
