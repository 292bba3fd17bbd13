//! camlink wire constants and message shapes.
//!
//! Every message except the heartbeat status code and the selection ack is
//! JSON.  The server speaks first on the discovery port (beacon) and on the
//! session stream after the handshake (camera list, then heartbeats).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Protocol constants ────────────────────────────────────────────────────────

/// UDP port on which servers broadcast their beacons.
pub const DISCOVERY_PORT: u16 = 37020;

/// UDP port on which the selected camera is streamed as RTP/H.264.
pub const VIDEO_PORT: u16 = 5000;

/// Literal sent by the client immediately after the TCP connect.
pub const HANDSHAKE_TOKEN: &[u8] = b"CLIENT_HANDSHAKE";

/// Byte the server sends to confirm a camera selection.
pub const SELECT_ACK: u8 = b'1';

// ── Receiver status ───────────────────────────────────────────────────────────

/// Congestion indicator piggybacked on heartbeat replies.
///
/// The numeric value is sent as ASCII decimal (`"200"`, `"300"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u16)]
pub enum ReceiverStatus {
    #[default]
    Normal = 200,
    Congested = 300,
}

impl ReceiverStatus {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// The heartbeat payload for this status.
    pub fn wire_bytes(self) -> Vec<u8> {
        self.code().to_string().into_bytes()
    }
}

impl TryFrom<u16> for ReceiverStatus {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            200 => Ok(ReceiverStatus::Normal),
            300 => Ok(ReceiverStatus::Congested),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ReceiverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReceiverStatus::Normal => write!(f, "normal ({})", self.code()),
            ReceiverStatus::Congested => write!(f, "congested ({})", self.code()),
        }
    }
}

// ── JSON payloads ─────────────────────────────────────────────────────────────

/// Discovery beacon as broadcast by a server.
///
/// Only `heartbeat_port` is required.  Unknown fields are kept so that the
/// client can show whatever the server chooses to advertise.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Beacon {
    pub heartbeat_port: u16,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Server response to the handshake.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CameraListResponse {
    pub cameras: Vec<i32>,
}

/// Client request naming the camera to stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectCameraRequest {
    pub camera_index: i32,
}
