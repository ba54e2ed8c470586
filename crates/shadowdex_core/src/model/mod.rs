//! Note and category records.

mod category;
mod note;

pub use category::{
    Category, CategoryId, DEFAULT_CATEGORY_COLOR, DEFAULT_ICON, FALLBACK_CATEGORY, PRESET_ICONS,
};
pub use note::{Note, NoteDraft, NoteFilter, NoteId};
