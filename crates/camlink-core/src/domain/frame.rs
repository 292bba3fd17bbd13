//! Decoded video frames and the bounded buffer that carries them from the
//! video decoder to the renderer.
//!
//! # Overflow policy
//!
//! [`FrameBuffer`] rejects the *incoming* frame when it is full.  Frames that
//! are already queued are never evicted, so a slow consumer sees a gap in the
//! stream rather than a reordering.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Capacity used by the client engine unless configured otherwise.
pub const DEFAULT_FRAME_CAPACITY: usize = 10;

/// Pixel layout of a decoded frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PixelFormat {
    Rgba,
    Rgbx,
    Rgb,
    Bgra,
    I420,
    Nv12,
    /// Any other format name reported by the decoder.
    Other(String),
}

impl PixelFormat {
    /// Canonical (GStreamer-style) name of the format.
    pub fn as_str(&self) -> &str {
        match self {
            PixelFormat::Rgba => "RGBA",
            PixelFormat::Rgbx => "RGBx",
            PixelFormat::Rgb => "RGB",
            PixelFormat::Bgra => "BGRA",
            PixelFormat::I420 => "I420",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Other(name) => name,
        }
    }

    /// Bytes per pixel for packed formats, `None` for planar or unknown ones.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Rgba | PixelFormat::Rgbx | PixelFormat::Bgra => Some(4),
            PixelFormat::Rgb => Some(3),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PixelFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "RGBA" => PixelFormat::Rgba,
            "RGBx" => PixelFormat::Rgbx,
            "RGB" => PixelFormat::Rgb,
            "BGRA" => PixelFormat::Bgra,
            "I420" => PixelFormat::I420,
            "NV12" => PixelFormat::Nv12,
            other => PixelFormat::Other(other.to_string()),
        })
    }
}

impl TryFrom<String> for PixelFormat {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PixelFormat> for String {
    fn from(value: PixelFormat) -> Self {
        value.as_str().to_string()
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            data,
        }
    }
}

/// Bounded FIFO of decoded frames that drops incoming frames on overflow.
#[derive(Debug)]
pub struct FrameBuffer {
    frames: VecDeque<VideoFrame>,
    capacity: usize,
    rejected: u64,
}

impl FrameBuffer {
    /// Creates an empty buffer.  A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
            rejected: 0,
        }
    }

    /// Appends `frame` if there is room.
    ///
    /// Returns `false` (and drops the frame) when the buffer is full.
    pub fn push(&mut self, frame: VideoFrame) -> bool {
        if self.frames.len() >= self.capacity {
            self.rejected += 1;
            return false;
        }
        self.frames.push_back(frame);
        true
    }

    /// Removes and returns the oldest frame.
    pub fn pop(&mut self) -> Option<VideoFrame> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames dropped on overflow since creation.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Discards every queued frame.  The rejection counter is kept.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CAPACITY)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
