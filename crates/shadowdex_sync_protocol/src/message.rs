//! Sync payload.
//!
//! Each peer sends exactly one message per session:
//!
//! ```text
//! { "type": "SYNC_DATA", "entries": [ <note>, ... ] }
//! ```
//!
//! encoded as CBOR. There is no acknowledgement and no chunking.

use crate::error::{ProtocolError, ProtocolResult};
use ciborium::value::Value;
use serde::{Deserialize, Serialize};
use shadowdex_core::Note;

/// Discriminator of the full-collection payload.
pub const SYNC_DATA: &str = "SYNC_DATA";

/// Default upper bound on an encoded payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// A message exchanged between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    /// The sender's entire note collection.
    #[serde(rename = "SYNC_DATA")]
    SyncData {
        /// Notes, in the order the sender read them.
        entries: Vec<Note>,
    },
}

/// Outcome of decoding inbound bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A message this build understands.
    Message(SyncMessage),
    /// Well-formed CBOR that is not a message this build understands.
    Ignored {
        /// Why it was skipped.
        reason: String,
    },
}

impl SyncMessage {
    /// Creates a full-collection payload.
    #[must_use]
    pub fn sync_data(entries: Vec<Note>) -> Self {
        Self::SyncData { entries }
    }

    /// Encodes to CBOR, refusing results larger than `max_bytes`.
    pub fn encode(&self, max_bytes: usize) -> ProtocolResult<Vec<u8>> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| ProtocolError::codec(e.to_string()))?;
        if bytes.len() > max_bytes {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }
        Ok(bytes)
    }

    /// Decodes inbound bytes.
    ///
    /// Oversized input and bytes that are not CBOR at all are errors.
    /// Valid CBOR with an unknown `type` or a shape that does not match is
    /// returned as [`Decoded::Ignored`].
    pub fn decode(bytes: &[u8], max_bytes: usize) -> ProtocolResult<Decoded> {
        if bytes.len() > max_bytes {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: max_bytes,
            });
        }

        let value: Value =
            ciborium::from_reader(bytes).map_err(|e| ProtocolError::codec(e.to_string()))?;

        let kind = match message_type(&value) {
            Some(kind) => kind,
            None => {
                return Ok(Decoded::Ignored {
                    reason: "no type discriminator".into(),
                })
            }
        };
        if kind != SYNC_DATA {
            return Ok(Decoded::Ignored {
                reason: format!("unknown message type '{kind}'"),
            });
        }

        match value.deserialized::<SyncMessage>() {
            Ok(message) => Ok(Decoded::Message(message)),
            Err(e) => Ok(Decoded::Ignored {
                reason: format!("malformed {SYNC_DATA}: {e}"),
            }),
        }
    }

    /// Returns the number of notes carried.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::SyncData { entries } => entries.len(),
        }
    }

    /// Returns true if the message carries no notes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn message_type(value: &Value) -> Option<&str> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_text() == Some("type"))
        .and_then(|(_, v)| v.as_text())
}
