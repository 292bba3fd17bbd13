//! Discovered streaming servers.
//!
//! A [`ServerRecord`] is created from the first beacon seen for a given
//! `(ip, heartbeat_port)` pair and never modified afterwards.  The
//! [`ServerSet`] keeps records in discovery order and guarantees that no two
//! records share a [`ServerKey`].

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::Serialize;
use serde_json::{Map, Value};

/// Identity of a discovered server: the sender address plus the advertised
/// heartbeat port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerKey {
    pub ip: IpAddr,
    pub heartbeat_port: u16,
}

impl fmt::Display for ServerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SocketAddr::new(self.ip, self.heartbeat_port))
    }
}

/// A server advertised by a discovery beacon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRecord {
    /// Source address of the beacon datagram.
    pub ip: IpAddr,
    /// TCP port on which the server accepts sessions.
    pub heartbeat_port: u16,
    /// Human-readable server name; empty when the beacon carries none.
    pub name: String,
    /// Every other field of the beacon, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServerRecord {
    /// Returns the deduplication key of this record.
    pub fn key(&self) -> ServerKey {
        ServerKey {
            ip: self.ip,
            heartbeat_port: self.heartbeat_port,
        }
    }

    /// Returns the TCP address used to open a session with this server.
    pub fn session_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.heartbeat_port)
    }

    /// Name to show to the user: the advertised name, or the session address.
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.session_addr().to_string()
        } else {
            self.name.clone()
        }
    }
}

/// Insertion-ordered set of [`ServerRecord`]s keyed by [`ServerKey`].
#[derive(Debug, Clone, Default)]
pub struct ServerSet {
    records: Vec<ServerRecord>,
    keys: HashSet<ServerKey>,
}

impl ServerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record` unless a record with the same key is already present.
    ///
    /// Returns `true` when the record was new.  An existing record is never
    /// replaced, even if the new beacon carries different fields.
    pub fn insert(&mut self, record: ServerRecord) -> bool {
        if !self.keys.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn contains(&self, key: &ServerKey) -> bool {
        self.keys.contains(key)
    }

    /// Records in the order they were first discovered.
    pub fn records(&self) -> &[ServerRecord] {
        &self.records
    }

    pub fn to_vec(&self) -> Vec<ServerRecord> {
        self.records.clone()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.keys.clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
