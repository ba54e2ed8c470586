//! Store configuration.

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether every commit is written through to the backend.
    ///
    /// When false, commits only update memory until [`crate::Database::flush`].
    pub sync_on_commit: bool,

    /// Whether a brand-new store is seeded with the default categories.
    pub populate_defaults: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            populate_defaults: true,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to write through on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether new stores get the default categories.
    #[must_use]
    pub const fn populate_defaults(mut self, value: bool) -> Self {
        self.populate_defaults = value;
        self
    }
}
