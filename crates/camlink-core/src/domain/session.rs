//! Session lifecycle states.
//!
//! ```text
//! Idle ──► Connecting ──► Connected ──► Disconnected ──► Idle
//!               │                                          ▲
//!               └──────────── (connect failed) ────────────┘
//! ```
//!
//! `Disconnected` is transient: it marks a session whose teardown is in
//! progress and is replaced by `Idle` once every resource has been released.

use serde::{Deserialize, Serialize};

/// State of the (single) client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session and no attempt in progress.
    #[default]
    Idle,
    /// TCP connect or handshake in progress.
    Connecting,
    /// Handshake complete; heartbeat and video are running.
    Connected,
    /// Teardown in progress.
    Disconnected,
}

impl ConnectionState {
    /// Returns `true` for the states that occupy the single session slot.
    pub fn is_live(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}
