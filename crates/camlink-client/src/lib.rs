//! camlink-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does camlink-client do?
//!
//! The client finds camera servers on the LAN and shows one of their cameras:
//!
//! 1. [`DiscoveryService`] listens for UDP beacons for a few seconds and
//!    reports each new server exactly once.
//! 2. [`ConnectionManager`] opens a TCP session to the chosen server, sends
//!    the handshake token, and receives the list of cameras.
//! 3. The caller picks a camera with [`ConnectionManager::select_camera`];
//!    the server acknowledges with a single byte and starts streaming.
//! 4. While connected, a heartbeat monitor answers the server's heartbeats
//!    with the receiver's congestion status and tears the session down when
//!    the server goes quiet, and the video bridge drives an external decoder
//!    and pushes decoded frames into a bounded [`FrameQueue`].
//!
//! Everything that happens in the background is reported as an event on a
//! channel; nothing calls back into the caller's code.

/// Application layer: event types and the frame queue handed to consumers.
pub mod application;

/// Infrastructure layer: network, video decoding, and configuration storage.
pub mod infrastructure;

pub use application::events::{DiscoveryEvent, EventSink, SessionEvent, VideoErrorKind};
pub use application::frame_queue::FrameQueue;
pub use infrastructure::network::connection_manager::{
    ConnectionManager, SessionConfig, SessionError, SessionSnapshot,
};
pub use infrastructure::network::discovery::{DiscoveryConfig, DiscoveryError, DiscoveryService};
pub use infrastructure::network::session::SessionSlot;
pub use infrastructure::video::{DecoderFactory, VideoConfig, VideoDecoder};
