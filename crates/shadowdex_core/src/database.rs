//! Database facade and recovery.

use crate::backend::{InMemoryBackend, StorageBackend};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::migration::{
    AppliedMigration, MigrationManager, MigrationVersion, LATEST_SCHEMA_VERSION,
};
use crate::model::Category;
use crate::snapshot::{Snapshot, StoreState};
use crate::transaction::Transaction;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// The main store handle.
///
/// `Database` owns the committed state of a ShadowDex store:
/// - Notes and categories, read without blocking each other
/// - A single writer at a time through [`Database::transaction`]
/// - Schema migration on open
///
/// # Opening a Store
///
/// ```rust,no_run
/// use shadowdex_core::Database;
/// use std::path::Path;
///
/// let db = Database::open(Path::new("notes.shadowdex"))?;
/// println!("{} notes", db.note_count());
/// # Ok::<(), shadowdex_core::CoreError>(())
/// ```
///
/// # In-Memory Stores
///
/// ```rust
/// let db = shadowdex_core::Database::open_in_memory().unwrap();
/// assert_eq!(db.categories().len(), 4);
/// ```
pub struct Database {
    /// Configuration.
    config: Config,
    /// Where committed snapshots go.
    backend: Box<dyn StorageBackend>,
    /// Committed state.
    state: RwLock<StoreState>,
    /// Serializes writers.
    write_lock: Mutex<()>,
    /// Committed changes not yet written to the backend.
    dirty: AtomicBool,
}

impl Database {
    /// Opens a store directory with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another process has the store locked (`DatabaseLocked`)
    /// - The store was written by a newer schema (`InvalidFormat`)
    /// - I/O errors occur
    #[cfg(feature = "std")]
    pub fn open(path: &std::path::Path) -> CoreResult<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Opens a store directory with a custom configuration.
    #[cfg(feature = "std")]
    pub fn open_with_config(path: &std::path::Path, config: Config) -> CoreResult<Self> {
        let backend = crate::backend::FileBackend::open(path, config.create_if_missing)?;
        Self::open_with_backend(Box::new(backend), config)
    }

    /// Opens a fresh store held in memory.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::open_with_backend(Box::new(InMemoryBackend::new()), Config::default())
    }

    /// Opens a store on an arbitrary backend.
    ///
    /// A backend without a snapshot yields a new store at the latest schema
    /// version. An existing snapshot is migrated forward if needed and the
    /// migrated snapshot written back before the store is returned.
    pub fn open_with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        let snapshot = match backend.load()? {
            Some(bytes) => {
                let mut snapshot = Snapshot::decode(&bytes)?;
                if snapshot.schema_version > LATEST_SCHEMA_VERSION {
                    return Err(CoreError::invalid_format(format!(
                        "store schema v{} is newer than supported v{}",
                        snapshot.schema_version, LATEST_SCHEMA_VERSION
                    )));
                }
                let result = MigrationManager::builtin().run_pending(&mut snapshot)?;
                if result.applied_count() > 0 {
                    backend.store(&snapshot.encode()?)?;
                }
                snapshot
            }
            None => {
                if !config.create_if_missing {
                    return Err(CoreError::invalid_format(
                        "store does not exist and create_if_missing is false",
                    ));
                }
                let snapshot = Snapshot {
                    schema_version: LATEST_SCHEMA_VERSION,
                    categories: if config.populate_defaults {
                        Category::defaults()
                    } else {
                        Vec::new()
                    },
                    ..Snapshot::default()
                };
                backend.store(&snapshot.encode()?)?;
                info!(schema = LATEST_SCHEMA_VERSION, "created new store");
                snapshot
            }
        };

        debug!(
            schema = snapshot.schema_version,
            notes = snapshot.notes.len(),
            categories = snapshot.categories.len(),
            "opened store"
        );

        Ok(Self {
            config,
            backend,
            state: RwLock::new(StoreState::from(snapshot)),
            write_lock: Mutex::new(()),
            dirty: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the schema version of the open store.
    #[must_use]
    pub fn schema_version(&self) -> MigrationVersion {
        self.state.read().schema_version
    }

    /// Returns the migrations applied to this store over its lifetime.
    #[must_use]
    pub fn applied_migrations(&self) -> Vec<AppliedMigration> {
        self.state.read().applied.clone()
    }

    /// Executes a function within a transaction.
    ///
    /// If the function returns `Ok`, every write it made is committed and
    /// persisted together. If it returns `Err`, or persisting fails, nothing
    /// is applied and the error is returned.
    ///
    /// ```rust
    /// use shadowdex_core::{Database, Note, NoteDraft, NoteId};
    ///
    /// let db = Database::open_in_memory().unwrap();
    /// db.transaction(|txn| {
    ///     txn.put_note(Note::from_draft(NoteId::from("a"), NoteDraft::new("A", "x"), 1));
    ///     txn.put_note(Note::from_draft(NoteId::from("b"), NoteDraft::new("B", "x"), 1));
    ///     Ok(())
    /// })
    /// .unwrap();
    /// assert_eq!(db.note_count(), 2);
    /// ```
    pub fn transaction<F, T>(&self, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    {
        let _writer = self.write_lock.lock();

        let (next, value) = {
            let committed = self.state.read();
            let mut txn = Transaction::new(&committed);
            let value = match f(&mut txn) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "transaction rolled back");
                    return Err(e);
                }
            };
            if txn.write_count() == 0 {
                return Ok(value);
            }
            let mut next = committed.clone();
            txn.apply_to(&mut next);
            (next, value)
        };

        if self.config.sync_on_commit {
            self.backend.store(&next.to_snapshot().encode()?)?;
        } else {
            self.dirty.store(true, Ordering::Release);
        }

        *self.state.write() = next;
        Ok(value)
    }

    /// Writes committed state to the backend if any commit is pending.
    pub fn flush(&self) -> CoreResult<()> {
        let _writer = self.write_lock.lock();
        if self.dirty.load(Ordering::Acquire) {
            let bytes = self.state.read().to_snapshot().encode()?;
            self.backend.store(&bytes)?;
            self.dirty.store(false, Ordering::Release);
        }
        Ok(())
    }

    /// Runs a read-only closure against the committed state.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.state.read())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            tracing::warn!(error = %e, "failed to flush store on close");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Database")
            .field("schema_version", &state.schema_version)
            .field("notes", &state.notes.len())
            .field("categories", &state.categories.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Note, NoteDraft, NoteId};

    struct FailingBackend {
        inner: InMemoryBackend,
        fail: std::sync::Arc<AtomicBool>,
    }

    impl StorageBackend for FailingBackend {
        fn load(&self) -> CoreResult<Option<Vec<u8>>> {
            self.inner.load()
        }

        fn store(&self, snapshot: &[u8]) -> CoreResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.inner.store(snapshot)
        }
    }

    fn note(id: &str) -> Note {
        Note::from_draft(NoteId::from(id), NoteDraft::new(id, "c"), 1)
    }

    #[test]
    fn new_store_has_defaults_at_latest_schema() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version(), LATEST_SCHEMA_VERSION);
        assert_eq!(db.categories().len(), 4);
        assert_eq!(db.note_count(), 0);
    }

    #[test]
    fn populate_defaults_can_be_disabled() {
        let db = Database::open_with_backend(
            Box::new(InMemoryBackend::new()),
            Config::new().populate_defaults(false),
        )
        .unwrap();
        assert!(db.categories().is_empty());
    }

    #[test]
    fn missing_store_without_create() {
        let result = Database::open_with_backend(
            Box::new(InMemoryBackend::new()),
            Config::new().create_if_missing(false),
        );
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }

    #[test]
    fn error_in_closure_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        let result: CoreResult<()> = db.transaction(|txn| {
            txn.put_note(note("a"));
            Err(CoreError::invalid_operation("stop"))
        });
        assert!(result.is_err());
        assert_eq!(db.note_count(), 0);
    }

    #[test]
    fn failed_persist_rolls_back() {
        let fail = std::sync::Arc::new(AtomicBool::new(false));
        let backend = FailingBackend {
            inner: InMemoryBackend::new(),
            fail: fail.clone(),
        };
        let db = Database::open_with_backend(Box::new(backend), Config::default()).unwrap();

        fail.store(true, Ordering::SeqCst);
        let result = db.transaction(|txn| {
            txn.put_note(note("a"));
            txn.put_note(note("b"));
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::Io(_))));
        assert_eq!(db.note_count(), 0);
    }

    #[test]
    fn reopen_from_shared_backend() {
        let backend = InMemoryBackend::new();
        {
            let db = Database::open_with_backend(Box::new(backend.clone()), Config::default())
                .unwrap();
            db.transaction(|txn| {
                txn.put_note(note("a"));
                Ok(())
            })
            .unwrap();
        }
        let db = Database::open_with_backend(Box::new(backend), Config::default()).unwrap();
        assert!(db.get_note(&NoteId::from("a")).unwrap().is_some());
    }

    #[test]
    fn deferred_writes_land_on_flush() {
        let backend = InMemoryBackend::new();
        let db = Database::open_with_backend(
            Box::new(backend.clone()),
            Config::new().sync_on_commit(false),
        )
        .unwrap();
        let before = backend.data();

        db.transaction(|txn| {
            txn.put_note(note("a"));
            Ok(())
        })
        .unwrap();
        assert_eq!(backend.data(), before);

        db.flush().unwrap();
        let snapshot = Snapshot::decode(&backend.data().unwrap()).unwrap();
        assert_eq!(snapshot.notes.len(), 1);
    }

    #[test]
    fn newer_schema_is_refused() {
        let snapshot = Snapshot {
            schema_version: LATEST_SCHEMA_VERSION + 1,
            ..Snapshot::default()
        };
        let backend = InMemoryBackend::with_data(snapshot.encode().unwrap());
        let result = Database::open_with_backend(Box::new(backend), Config::default());
        assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
    }
}
