//! # ShadowDex Sync Protocol
//!
//! Wire types shared by the sync engine and the rendezvous service.
//!
//! This crate provides:
//! - [`RendezvousId`], the session id shown as a QR code, and its
//!   [`RendezvousToken`] as seen by the rendezvous service
//! - [`SyncMessage`], the payload each peer sends once per session
//! - [`ControlRequest`]/[`ControlResponse`] for the rendezvous service
//! - Length-prefixed frame headers
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod control;
mod error;
mod frame;
mod message;
mod rendezvous;

pub use control::{ControlRequest, ControlResponse};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{decode_frame_len, encode_frame, FRAME_HEADER_LEN, MAX_CONTROL_FRAME};
pub use message::{Decoded, SyncMessage, DEFAULT_MAX_PAYLOAD_BYTES, SYNC_DATA};
pub use rendezvous::{
    RendezvousId, RendezvousToken, MAX_SUFFIX_LEN, RENDEZVOUS_PREFIX, SUFFIX_LEN,
};

/// Protocol version spoken by this build.
pub const PROTOCOL_VERSION: u16 = 1;
