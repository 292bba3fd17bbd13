//! Video infrastructure: the bridge between an external decoder and the
//! frame queue.
//!
//! # Sub-modules
//!
//! - **`decoder`** – The `VideoDecoder` trait every decoder implements, its
//!   control events and errors.
//! - **`pipeline`** – The declarative pipeline description handed to a
//!   decoder.
//! - **`bridge`** – The `camlink-video` thread that pulls frames and drains
//!   decoder events.
//! - **`congestion`** – QoS-based receiver status shared with the heartbeat.
//! - **`mock`** – Scripted decoder for tests and decoder-less builds.
//! - **`gst`** – GStreamer decoder, compiled with the `gstreamer` feature.

pub mod bridge;
pub mod congestion;
pub mod decoder;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod mock;
pub mod pipeline;

pub use bridge::{BridgeContext, VideoBridge, VideoConfig};
pub use congestion::{CongestionTracker, SharedStatus};
pub use decoder::{DecodeError, DecoderEvent, DecoderFactory, NullDecoder, VideoDecoder};
pub use pipeline::PipelineDescription;
