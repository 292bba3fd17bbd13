//! Infrastructure layer for the client application.
//!
//! Contains the OS-facing adapters: UDP and TCP network I/O, the video decoder
//! bridge, and configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `camlink_core`, but MUST NOT be imported by the `application` or domain
//! layers.
//!
//! # Sub-modules
//!
//! - **`network`** – Discovery listener, the session state machine with its
//!   heartbeat monitor and camera selector.
//!
//! - **`video`** – The bridge thread that drives an external decoder and feeds
//!   the frame queue.  The decoder itself sits behind the `VideoDecoder`
//!   trait; a GStreamer implementation is available with the `gstreamer`
//!   feature and a scripted `MockDecoder` is always available.
//!
//! - **`storage`** – Loading and saving the TOML configuration file.

pub mod network;
pub mod storage;
pub mod video;
