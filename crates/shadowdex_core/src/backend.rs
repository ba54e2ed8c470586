//! Storage backends.
//!
//! Backends are **opaque snapshot stores**: they hold the latest encoded
//! snapshot of the whole store and know nothing about notes or categories.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK              # Advisory lock for single-writer
//! ├─ SNAPSHOT          # Latest committed snapshot (CBOR)
//! └─ SNAPSHOT.tmp      # Written then renamed over SNAPSHOT
//! ```

use crate::error::CoreResult;
use parking_lot::RwLock;
use std::sync::Arc;

/// A snapshot store.
///
/// # Invariants
///
/// - `load` returns exactly the bytes of the last successful `store`
/// - A failed `store` leaves the previous snapshot intact
/// - Backends must be `Send + Sync` for concurrent access
pub trait StorageBackend: Send + Sync {
    /// Loads the last stored snapshot, or `None` for a new store.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load(&self) -> CoreResult<Option<Vec<u8>>>;

    /// Replaces the stored snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot could not be made durable. The
    /// previous snapshot must still be readable afterwards.
    fn store(&self, snapshot: &[u8]) -> CoreResult<()>;
}

/// An in-memory backend.
///
/// Clones share the same underlying buffer, so a test can keep a handle
/// and reopen a store from it.
///
/// ```rust
/// use shadowdex_core::{InMemoryBackend, StorageBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.store(b"snapshot").unwrap();
/// assert_eq!(backend.load().unwrap(), Some(b"snapshot".to_vec()));
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    data: Arc<RwLock<Option<Vec<u8>>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend holding pre-existing snapshot bytes.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(Some(data))),
        }
    }

    /// Returns a copy of the stored snapshot.
    #[must_use]
    pub fn data(&self) -> Option<Vec<u8>> {
        self.data.read().clone()
    }
}

impl StorageBackend for InMemoryBackend {
    fn load(&self) -> CoreResult<Option<Vec<u8>>> {
        Ok(self.data.read().clone())
    }

    fn store(&self, snapshot: &[u8]) -> CoreResult<()> {
        *self.data.write() = Some(snapshot.to_vec());
        Ok(())
    }
}

#[cfg(feature = "std")]
mod file {
    use super::StorageBackend;
    use crate::error::{CoreError, CoreResult};
    use fs2::FileExt;
    use std::fs::{self, File, OpenOptions};
    use std::io::{ErrorKind, Read, Write};
    use std::path::{Path, PathBuf};

    const LOCK_FILE: &str = "LOCK";
    const SNAPSHOT_FILE: &str = "SNAPSHOT";
    const SNAPSHOT_TEMP: &str = "SNAPSHOT.tmp";

    /// A directory-backed snapshot store.
    ///
    /// Holds an exclusive advisory lock on the directory for its lifetime.
    #[derive(Debug)]
    pub struct FileBackend {
        path: PathBuf,
        _lock_file: File,
    }

    impl FileBackend {
        /// Opens or creates a store directory.
        ///
        /// # Errors
        ///
        /// Returns an error if:
        /// - The directory doesn't exist and `create_if_missing` is false
        /// - Another process holds the lock (`DatabaseLocked`)
        /// - I/O errors occur
        pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
            if !path.exists() {
                if create_if_missing {
                    fs::create_dir_all(path)?;
                } else {
                    return Err(CoreError::invalid_format(format!(
                        "store directory does not exist: {}",
                        path.display()
                    )));
                }
            }

            if !path.is_dir() {
                return Err(CoreError::invalid_format(format!(
                    "path is not a directory: {}",
                    path.display()
                )));
            }

            let lock_file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path.join(LOCK_FILE))?;

            if lock_file.try_lock_exclusive().is_err() {
                return Err(CoreError::DatabaseLocked);
            }

            Ok(Self {
                path: path.to_path_buf(),
                _lock_file: lock_file,
            })
        }

        /// Returns the store directory.
        #[must_use]
        pub fn path(&self) -> &Path {
            &self.path
        }

        /// Returns the path of the committed snapshot file.
        #[must_use]
        pub fn snapshot_path(&self) -> PathBuf {
            self.path.join(SNAPSHOT_FILE)
        }

        #[cfg(unix)]
        fn sync_directory(&self) -> CoreResult<()> {
            File::open(&self.path)?.sync_all()?;
            Ok(())
        }

        #[cfg(not(unix))]
        fn sync_directory(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    impl StorageBackend for FileBackend {
        fn load(&self) -> CoreResult<Option<Vec<u8>>> {
            let mut file = match File::open(self.snapshot_path()) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            if data.is_empty() {
                return Ok(None);
            }
            Ok(Some(data))
        }

        fn store(&self, snapshot: &[u8]) -> CoreResult<()> {
            let temp_path = self.path.join(SNAPSHOT_TEMP);

            let mut file = File::create(&temp_path)?;
            file.write_all(snapshot)?;
            file.sync_all()?;
            drop(file);

            fs::rename(&temp_path, self.snapshot_path())?;
            self.sync_directory()?;
            Ok(())
        }
    }

}

#[cfg(feature = "std")]
pub use file::FileBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.load().unwrap().is_none());
    }

    #[test]
    fn memory_clones_share_data() {
        let backend = InMemoryBackend::new();
        let handle = backend.clone();
        backend.store(b"abc").unwrap();
        assert_eq!(handle.data(), Some(b"abc".to_vec()));
    }
}
