//! Rendezvous identifiers.
//!
//! A rendezvous id is the only secret two peers share. It travels
//! out-of-band (a QR code) and is never sent to the rendezvous service;
//! the service only sees its [`RendezvousToken`].

use crate::error::{ProtocolError, ProtocolResult};
use rand::Rng;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Prefix every rendezvous id starts with.
pub const RENDEZVOUS_PREFIX: &str = "shadow-dex-";

/// Length of the random suffix of freshly minted ids, and the minimum
/// accepted when parsing.
pub const SUFFIX_LEN: usize = 8;

/// Longest suffix accepted when parsing.
pub const MAX_SUFFIX_LEN: usize = 32;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A validated rendezvous id: `shadow-dex-` followed by eight to 32
/// characters from `[a-z0-9]`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RendezvousId(String);

impl RendezvousId {
    /// Mints a new id with an eight-character random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
            .collect();
        Self(format!("{RENDEZVOUS_PREFIX}{suffix}"))
    }

    /// Parses and validates an id. Surrounding whitespace is ignored.
    pub fn parse(input: &str) -> ProtocolResult<Self> {
        let id = input.trim();
        let suffix = id
            .strip_prefix(RENDEZVOUS_PREFIX)
            .ok_or_else(|| ProtocolError::invalid_id(id, "missing shadow-dex- prefix"))?;
        if suffix.len() < SUFFIX_LEN {
            return Err(ProtocolError::invalid_id(id, "suffix is too short"));
        }
        if suffix.len() > MAX_SUFFIX_LEN {
            return Err(ProtocolError::invalid_id(id, "suffix is too long"));
        }
        if !suffix.bytes().all(|b| ALPHABET.contains(&b)) {
            return Err(ProtocolError::invalid_id(
                id,
                "suffix may only contain a-z and 0-9",
            ));
        }
        Ok(Self(id.to_string()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the token the rendezvous service indexes this id by.
    #[must_use]
    pub fn token(&self) -> RendezvousToken {
        let digest = Sha256::digest(self.0.as_bytes());
        RendezvousToken(digest.iter().map(|b| format!("{b:02x}")).collect())
    }
}

impl FromStr for RendezvousId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for RendezvousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RendezvousId({})", self.0)
    }
}

impl fmt::Display for RendezvousId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RendezvousId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lowercase hex SHA-256 of a rendezvous id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RendezvousToken(String);

impl RendezvousToken {
    /// Wraps a token received over the wire.
    #[must_use]
    pub fn from_wire(token: String) -> Self {
        Self(token)
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the token string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RendezvousToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
