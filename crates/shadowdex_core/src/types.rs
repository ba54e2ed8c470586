//! Core type definitions.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, in the clock of the device that wrote it.
pub type Timestamp = u64;

/// Returns the current wall-clock time as a [`Timestamp`].
#[must_use]
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}
