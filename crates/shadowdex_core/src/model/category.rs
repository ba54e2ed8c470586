//! Category record. Categories are local only and never synchronized.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Icon used when none is chosen.
pub const DEFAULT_ICON: &str = "Hash";

/// Color given to user-created categories.
pub const DEFAULT_CATEGORY_COLOR: &str = "#6B7280";

/// Category that notes fall back to when theirs is deleted.
pub const FALLBACK_CATEGORY: &str = "その他";

/// Icon names offered for categories, with display labels.
pub const PRESET_ICONS: &[(&str, &str)] = &[
    ("User", "人物"),
    ("Book", "本"),
    ("Hash", "ハッシュタグ"),
    ("Briefcase", "かばん"),
    ("Folder", "フォルダ"),
    ("Star", "星"),
    ("Tag", "タグ"),
    ("AlertCircle", "注意"),
];

/// Category identifier.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryId(String);

impl CategoryId {
    /// Mints a new random category ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CategoryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CategoryId({})", self.0)
    }
}

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CategoryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A category.
///
/// `icon` and `sort_order` default on decode because stores written by the
/// first schema version have neither; migrations fill them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Identifier.
    pub id: CategoryId,
    /// Display name; notes refer to categories by this name.
    pub name: String,
    /// Icon name.
    #[serde(default)]
    pub icon: String,
    /// Display color.
    pub color: String,
    /// Protected default category.
    #[serde(default)]
    pub is_default: bool,
    /// Display position.
    #[serde(default)]
    pub sort_order: u32,
}

impl Category {
    /// The four protected categories seeded into a new store.
    #[must_use]
    pub fn defaults() -> Vec<Category> {
        [
            ("cat-1", "人物メモ", "User", "#4F46E5"),
            ("cat-2", "社内用語", "Book", "#10B981"),
            ("cat-3", "ローカルルール", "Hash", "#F59E0B"),
            ("cat-4", FALLBACK_CATEGORY, "Hash", DEFAULT_CATEGORY_COLOR),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (id, name, icon, color))| Category {
            id: CategoryId::from(id),
            name: name.to_string(),
            icon: icon.to_string(),
            color: color.to_string(),
            is_default: true,
            sort_order: i as u32,
        })
        .collect()
    }
}
