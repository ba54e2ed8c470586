//! # ShadowDex Rendezvous
//!
//! A minimal signaling service that lets two ShadowDex peers find each
//! other, plus the client both peers use to talk to it.
//!
//! This crate provides:
//! - [`RendezvousServer`], a TCP service mapping tokens to host addresses
//! - [`RendezvousClient`] for registering and looking up hosts
//! - Async length-prefixed frame I/O shared with the peer transport
//!
//! # Protocol
//!
//! 1. The host connects, sends `Register { token, addr }` and keeps the
//!    connection open while it waits for its peer
//! 2. The guest connects, sends `Lookup { token }` and receives the address
//! 3. The guest connects to the host directly; the service never carries
//!    note data
//! 4. The registration disappears when the host's connection closes
//!
//! Tokens are SHA-256 digests of rendezvous ids, so the service cannot
//! derive the id the peers use to key their session.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod error;
mod frame_io;
mod handler;
mod registry;
mod server;

pub use client::{ControlConnection, Registration, RendezvousClient};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use frame_io::{read_frame, write_frame};
pub use handler::{ConnectionId, RequestHandler};
pub use registry::Registry;
pub use server::{RendezvousServer, ServerHandle};
