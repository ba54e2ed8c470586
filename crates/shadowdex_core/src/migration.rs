//! Schema migrations.
//!
//! Migrations are:
//! - **Forward-only**: there is no downgrade path
//! - **Snapshot-level**: each migration rewrites a decoded [`Snapshot`]
//! - **All-or-nothing**: pending migrations run on a copy that replaces the
//!   original only if every one of them succeeds
//!
//! ## Versions
//!
//! | Version | Change |
//! |---|---|
//! | 1 | Initial schema (notes, categories with name and color) |
//! | 2 | Every category gets an icon, defaulting to `Hash` |
//! | 3 | Every category gets a sort order from its list position |

use crate::error::{CoreError, CoreResult};
use crate::model::DEFAULT_ICON;
use crate::snapshot::Snapshot;
use crate::types::now_millis;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Version number for migrations.
pub type MigrationVersion = u64;

/// The schema version written by this build.
pub const LATEST_SCHEMA_VERSION: MigrationVersion = 3;

/// Information about a registered migration.
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    /// Version number (unique, sequential).
    pub version: MigrationVersion,
    /// Human-readable name.
    pub name: String,
}

/// Record of a migration applied to a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMigration {
    /// Version number.
    pub version: MigrationVersion,
    /// Migration name.
    pub name: String,
    /// When it was applied (Unix milliseconds).
    pub applied_at: u64,
}

/// Result of running all pending migrations.
#[derive(Debug, Clone, Default)]
pub struct MigrationRunResult {
    /// Versions applied, in order.
    pub applied: Vec<MigrationVersion>,
    /// Schema version after the run.
    pub final_version: MigrationVersion,
}

impl MigrationRunResult {
    /// Number of migrations applied.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// A schema migration.
pub trait Migration: Send + Sync {
    /// Version this migration upgrades the schema to.
    fn version(&self) -> MigrationVersion;

    /// Name of this migration.
    fn name(&self) -> &str;

    /// Rewrites the snapshot to the new schema.
    fn up(&self, snapshot: &mut Snapshot) -> CoreResult<()>;
}

/// Gives every category without an icon the default icon.
pub struct CategoryIcons;

impl Migration for CategoryIcons {
    fn version(&self) -> MigrationVersion {
        2
    }

    fn name(&self) -> &str {
        "category_icons"
    }

    fn up(&self, snapshot: &mut Snapshot) -> CoreResult<()> {
        for category in &mut snapshot.categories {
            if category.icon.is_empty() {
                category.icon = DEFAULT_ICON.to_string();
            }
        }
        Ok(())
    }
}

/// Numbers categories by their stored position.
pub struct CategorySortOrder;

impl Migration for CategorySortOrder {
    fn version(&self) -> MigrationVersion {
        3
    }

    fn name(&self) -> &str {
        "category_sort_order"
    }

    fn up(&self, snapshot: &mut Snapshot) -> CoreResult<()> {
        for (i, category) in snapshot.categories.iter_mut().enumerate() {
            category.sort_order = u32::try_from(i)
                .map_err(|_| CoreError::migration_failed("too many categories"))?;
        }
        Ok(())
    }
}

/// Manages migrations.
pub struct MigrationManager {
    migrations: BTreeMap<MigrationVersion, Box<dyn Migration>>,
}

impl MigrationManager {
    /// Creates an empty migration manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            migrations: BTreeMap::new(),
        }
    }

    /// Creates a manager with the built-in schema migrations.
    #[must_use]
    pub fn builtin() -> Self {
        let mut manager = Self::new();
        manager.migrations.insert(2, Box::new(CategoryIcons));
        manager.migrations.insert(3, Box::new(CategorySortOrder));
        manager
    }

    /// Registers a migration.
    ///
    /// Returns an error if a migration with the same version already exists.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        let version = migration.version();
        if self.migrations.contains_key(&version) {
            return Err(CoreError::migration_failed(format!(
                "migration version {version} already registered"
            )));
        }
        self.migrations.insert(version, migration);
        Ok(())
    }

    /// Returns the registered migrations.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations.values().map(|m| info_of(m.as_ref())).collect()
    }

    /// Returns migrations newer than the snapshot's schema version.
    #[must_use]
    pub fn pending(&self, snapshot: &Snapshot) -> Vec<MigrationInfo> {
        self.migrations
            .range(snapshot.schema_version + 1..)
            .map(|(_, m)| info_of(m.as_ref()))
            .collect()
    }

    /// Runs all pending migrations.
    ///
    /// On failure the snapshot is left exactly as it was.
    pub fn run_pending(&self, snapshot: &mut Snapshot) -> CoreResult<MigrationRunResult> {
        let mut working = snapshot.clone();
        let mut result = MigrationRunResult {
            applied: Vec::new(),
            final_version: working.schema_version,
        };

        for (version, migration) in self.migrations.range(snapshot.schema_version + 1..) {
            migration.up(&mut working).map_err(|e| {
                CoreError::migration_failed(format!("{} (v{version}): {e}", migration.name()))
            })?;
            working.schema_version = *version;
            working.applied.push(AppliedMigration {
                version: *version,
                name: migration.name().to_string(),
                applied_at: now_millis(),
            });
            info!(version, name = migration.name(), "applied schema migration");
            result.applied.push(*version);
        }

        result.final_version = working.schema_version;
        *snapshot = working;
        Ok(result)
    }
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::builtin()
    }
}

fn info_of(migration: &dyn Migration) -> MigrationInfo {
    MigrationInfo {
        version: migration.version(),
        name: migration.name().to_string(),
    }
}
