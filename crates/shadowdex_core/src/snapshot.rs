//! Persisted snapshot format.

use crate::error::{CoreError, CoreResult};
use crate::migration::{AppliedMigration, MigrationVersion};
use crate::model::{Category, CategoryId, Note, NoteId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The whole store as written to a backend.
///
/// Encoded as CBOR. Collections are stored as lists; order is not
/// significant except for categories written by schema version 1, whose
/// list position becomes their sort order during migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema version the data conforms to.
    pub schema_version: MigrationVersion,
    /// Migrations applied to this store.
    #[serde(default)]
    pub applied: Vec<AppliedMigration>,
    /// Notes.
    #[serde(default)]
    pub notes: Vec<Note>,
    /// Categories.
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Snapshot {
    /// Encodes to CBOR.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
    }
}

/// Committed in-memory state.
#[derive(Debug, Clone, Default)]
pub(crate) struct StoreState {
    pub schema_version: MigrationVersion,
    pub applied: Vec<AppliedMigration>,
    pub notes: BTreeMap<NoteId, Note>,
    pub categories: BTreeMap<CategoryId, Category>,
}

impl From<Snapshot> for StoreState {
    fn from(snapshot: Snapshot) -> Self {
        Self {
            schema_version: snapshot.schema_version,
            applied: snapshot.applied,
            notes: snapshot
                .notes
                .into_iter()
                .map(|n| (n.id.clone(), n))
                .collect(),
            categories: snapshot
                .categories
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
        }
    }
}

impl StoreState {
    /// Builds the snapshot to persist.
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            schema_version: self.schema_version,
            applied: self.applied.clone(),
            notes: self.notes.values().cloned().collect(),
            categories: self.categories.values().cloned().collect(),
        }
    }
}
