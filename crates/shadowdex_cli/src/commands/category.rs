//! Category commands.

use super::CliResult;
use shadowdex_core::{Category, CategoryId, CoreError, Database};

/// Lists categories in display order.
pub fn list(db: &Database, json: bool) -> CliResult<()> {
    let categories = db.categories();
    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
        return Ok(());
    }
    for category in &categories {
        let marker = if category.is_default { " (default)" } else { "" };
        println!(
            "{}  {} [{}] {}{}",
            category.id, category.name, category.icon, category.color, marker
        );
    }
    Ok(())
}

/// Adds a category and prints its id.
pub fn add(db: &Database, name: &str, icon: &str) -> CliResult<()> {
    let category = db.create_category(name, icon)?;
    println!("{}", category.id);
    Ok(())
}

/// Renames a category, keeping its icon unless a new one is given.
pub fn rename(db: &Database, id: &str, name: &str, icon: Option<&str>) -> CliResult<Category> {
    let id = CategoryId::from(id);
    let current = db
        .get_category(&id)
        .ok_or_else(|| CoreError::CategoryNotFound { id: id.to_string() })?;
    let category = db.update_category(&id, name, icon.unwrap_or(&current.icon))?;
    println!("Renamed {} to {}", current.name, category.name);
    Ok(category)
}

/// Deletes a category.
pub fn delete(db: &Database, id: &str) -> CliResult<()> {
    let moved = db.delete_category(&CategoryId::from(id))?;
    println!("Deleted {id}; {moved} note(s) moved");
    Ok(())
}
