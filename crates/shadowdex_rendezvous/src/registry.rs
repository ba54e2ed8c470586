//! Host registrations.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;

/// Token to host address map.
///
/// Each registration remembers the connection that made it so the whole
/// set can be dropped when that connection goes away.
pub struct Registry {
    entries: RwLock<HashMap<String, Entry>>,
    max_entries: usize,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    addr: SocketAddr,
    owner: u64,
}

impl Registry {
    /// Creates an empty registry holding at most `max_entries` hosts.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries,
        }
    }

    /// Registers a host, or explains why not.
    pub fn register(&self, token: &str, addr: SocketAddr, owner: u64) -> Result<(), String> {
        let mut entries = self.entries.write();
        if entries.contains_key(token) {
            return Err("token already registered".into());
        }
        if entries.len() >= self.max_entries {
            return Err("too many registrations".into());
        }
        entries.insert(token.to_string(), Entry { addr, owner });
        Ok(())
    }

    /// Looks up a host address.
    pub fn lookup(&self, token: &str) -> Option<SocketAddr> {
        self.entries.read().get(token).map(|e| e.addr)
    }

    /// Drops every registration made by `owner`. Returns how many.
    pub fn release(&self, owner: u64) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, e| e.owner != owner);
        before - entries.len()
    }

    /// Returns the number of registrations.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
