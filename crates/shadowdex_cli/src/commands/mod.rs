//! CLI command implementations.

pub mod category;
pub mod inspect;
pub mod note;
pub mod rendezvous;
pub mod sync;

use shadowdex_core::{CoreError, Database};
use shadowdex_sync_engine::SyncError;
use std::path::Path;
use thiserror::Error;

/// Errors reported by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The command needs `--path`.
    #[error("store path required for {0} (use --path)")]
    MissingPath(&'static str),

    /// Store error.
    #[error(transparent)]
    Store(#[from] CoreError),

    /// Sync error.
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Rendezvous service error.
    #[error(transparent)]
    Rendezvous(#[from] shadowdex_rendezvous::ServerError),

    /// Output could not be written.
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for CLI commands.
pub type CliResult<T> = Result<T, CliError>;

/// Opens the store at `path`, creating it if needed.
pub fn open_store(path: Option<&Path>, command: &'static str) -> CliResult<Database> {
    let path = path.ok_or(CliError::MissingPath(command))?;
    Ok(Database::open(path)?)
}
