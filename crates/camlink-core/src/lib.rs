//! # camlink-core
//!
//! Shared library for camlink containing the wire protocol spoken with
//! streaming servers and the domain entities the client engine is built on.
//!
//! This crate has zero dependencies on sockets, threads, or OS APIs.  Every
//! function here is deterministic and can be tested without a network.
//!
//! # Architecture overview
//!
//! A camlink server advertises itself on the LAN with a UDP beacon, accepts a
//! TCP session on its heartbeat port, offers a list of cameras, and streams
//! the selected camera as RTP/H.264 to the client.  This crate defines:
//!
//! - **`protocol`** – How bytes travel over the network: the JSON beacon, the
//!   handshake token, the camera-list response, the camera selection request
//!   and its single-byte acknowledgment, and the heartbeat status code.
//!
//! - **`domain`** – The data the client engine keeps: the deduplicated set of
//!   discovered servers, the session state machine states, and the bounded
//!   frame buffer between the video decoder and the renderer.

pub mod domain;
pub mod protocol;

pub use domain::frame::{FrameBuffer, PixelFormat, VideoFrame, DEFAULT_FRAME_CAPACITY};
pub use domain::server::{ServerKey, ServerRecord, ServerSet};
pub use domain::session::ConnectionState;
pub use protocol::codec::{
    check_select_ack, decode_camera_list, encode_select_request, is_select_ack, parse_beacon,
    ProtocolError,
};
pub use protocol::messages::ReceiverStatus;
