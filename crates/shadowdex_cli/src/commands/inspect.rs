//! Inspect command implementation.

use super::CliResult;
use shadowdex_core::migration::{AppliedMigration, MigrationVersion};
use shadowdex_core::Database;
use serde::Serialize;
use std::path::Path;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Schema version.
    pub schema_version: MigrationVersion,
    /// Number of notes.
    pub note_count: usize,
    /// Number of categories.
    pub category_count: usize,
    /// Notes per category name, in category order.
    pub notes_per_category: Vec<(String, usize)>,
    /// Migrations applied to this store.
    pub migrations: Vec<AppliedMigration>,
}

/// Collects store metadata.
pub fn inspect(db: &Database, path: &Path) -> CliResult<InspectResult> {
    let notes = db.all_notes()?;
    let categories = db.categories();
    let notes_per_category = categories
        .iter()
        .map(|c| {
            let count = notes.iter().filter(|n| n.category == c.name).count();
            (c.name.clone(), count)
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        schema_version: db.schema_version(),
        note_count: notes.len(),
        category_count: categories.len(),
        notes_per_category,
        migrations: db.applied_migrations(),
    })
}

/// Runs the inspect command.
pub fn run(db: &Database, path: &Path, format: &str) -> CliResult<()> {
    let result = inspect(db, path)?;
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("ShadowDex Store Inspection");
    println!("=========================");
    println!();
    println!("Path: {}", result.path);
    println!("Schema version: {}", result.schema_version);
    println!();
    println!("Notes:      {}", result.note_count);
    println!("Categories: {}", result.category_count);
    for (name, count) in &result.notes_per_category {
        println!("  {name}: {count}");
    }

    if !result.migrations.is_empty() {
        println!();
        println!("Applied Migrations:");
        for migration in &result.migrations {
            println!(
                "  v{}: {} (applied at {})",
                migration.version, migration.name, migration.applied_at
            );
        }
    }
}
