//! Category operations on [`Database`].
//!
//! Notes refer to categories by name, so renaming or deleting a category
//! rewrites the notes that use it in the same transaction.

use crate::database::Database;
use crate::error::{CoreError, CoreResult};
use crate::model::{Category, CategoryId, DEFAULT_CATEGORY_COLOR, FALLBACK_CATEGORY};
use crate::notes::next_timestamp;
use crate::transaction::Transaction;
use tracing::debug;

impl Database {
    /// Returns every category ordered by sort order.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        let mut categories: Vec<Category> =
            self.read(|state| state.categories.values().cloned().collect());
        categories.sort_by_key(|c| c.sort_order);
        categories
    }

    /// Gets a category by id.
    #[must_use]
    pub fn get_category(&self, id: &CategoryId) -> Option<Category> {
        self.read(|state| state.categories.get(id).cloned())
    }

    /// Creates a category after the last one.
    pub fn create_category(&self, name: &str, icon: &str) -> CoreResult<Category> {
        let name = validate_name(name)?;
        let category = self.transaction(|txn| {
            let existing = txn.categories();
            ensure_unique(&existing, name, None)?;
            let sort_order = existing
                .iter()
                .map(|c| c.sort_order + 1)
                .max()
                .unwrap_or(0);
            let category = Category {
                id: CategoryId::new(),
                name: name.to_string(),
                icon: icon.to_string(),
                color: DEFAULT_CATEGORY_COLOR.to_string(),
                is_default: false,
                sort_order,
            };
            txn.put_category(category.clone());
            Ok(category)
        })?;
        debug!(id = %category.id, name = %category.name, "created category");
        Ok(category)
    }

    /// Renames a category and changes its icon.
    ///
    /// Notes filed under the old name move to the new one, and their
    /// `updated_at` is bumped. Default categories cannot be edited.
    pub fn update_category(&self, id: &CategoryId, name: &str, icon: &str) -> CoreResult<Category> {
        let name = validate_name(name)?;
        self.transaction(|txn| {
            let previous = editable(txn, id)?;
            ensure_unique(&txn.categories(), name, Some(id))?;
            if previous.name != name {
                let moved = refile_notes(txn, &previous.name, name);
                debug!(from = %previous.name, to = name, moved, "renamed category");
            }
            let category = Category {
                name: name.to_string(),
                icon: icon.to_string(),
                ..previous
            };
            txn.put_category(category.clone());
            Ok(category)
        })
    }

    /// Deletes a category, moving its notes to the fallback category.
    ///
    /// Returns the number of notes moved. Default categories cannot be
    /// deleted.
    pub fn delete_category(&self, id: &CategoryId) -> CoreResult<usize> {
        self.transaction(|txn| {
            let previous = editable(txn, id)?;
            txn.delete_category(id);
            let moved = refile_notes(txn, &previous.name, FALLBACK_CATEGORY);
            debug!(name = %previous.name, moved, "deleted category");
            Ok(moved)
        })
    }
}

fn validate_name(name: &str) -> CoreResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::invalid_operation("category name is empty"));
    }
    Ok(name)
}

fn ensure_unique(existing: &[Category], name: &str, except: Option<&CategoryId>) -> CoreResult<()> {
    let taken = existing
        .iter()
        .any(|c| c.name == name && Some(&c.id) != except);
    if taken {
        return Err(CoreError::invalid_operation(format!(
            "category '{name}' already exists"
        )));
    }
    Ok(())
}

fn editable(txn: &Transaction<'_>, id: &CategoryId) -> CoreResult<Category> {
    let category = txn
        .get_category(id)
        .ok_or_else(|| CoreError::CategoryNotFound { id: id.to_string() })?;
    if category.is_default {
        return Err(CoreError::ProtectedCategory {
            name: category.name,
        });
    }
    Ok(category)
}

fn refile_notes(txn: &mut Transaction<'_>, from: &str, to: &str) -> usize {
    let affected: Vec<_> = txn
        .notes()
        .into_iter()
        .filter(|n| n.category == from)
        .collect();
    let count = affected.len();
    for mut note in affected {
        note.category = to.to_string();
        note.updated_at = next_timestamp(note.updated_at);
        txn.put_note(note);
    }
    count
}
