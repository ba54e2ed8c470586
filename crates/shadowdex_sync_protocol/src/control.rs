//! Rendezvous control messages.
//!
//! A host opens a control connection, sends [`ControlRequest::Register`] and
//! keeps the connection open while it waits; the registration is dropped
//! when the connection closes. A guest sends [`ControlRequest::Lookup`] and
//! connects to the returned address directly.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Request sent to the rendezvous service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlRequest {
    /// Announce the address a host accepts its peer on.
    Register {
        /// Token of the host's rendezvous id.
        token: String,
        /// `ip:port` the guest should connect to.
        addr: String,
    },
    /// Ask where the host of a token is.
    Lookup {
        /// Token of the rendezvous id the guest scanned.
        token: String,
    },
}

/// Response from the rendezvous service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlResponse {
    /// Registration accepted.
    Registered,
    /// Lookup succeeded.
    Found {
        /// Host address.
        addr: String,
    },
    /// No host is registered under the token.
    NotFound,
    /// The request was refused.
    Rejected {
        /// Why.
        reason: String,
    },
}

impl ControlRequest {
    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }
}

impl ControlResponse {
    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode(bytes)
    }

    /// Creates a rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

fn encode<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| ProtocolError::codec(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::codec(e.to_string()))
}
