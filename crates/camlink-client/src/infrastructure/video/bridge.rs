//! The video bridge: drives a [`VideoDecoder`] on a dedicated thread.
//!
//! While the session is connected the bridge thread (`camlink-video`):
//!
//! 1. Starts the decoder with the [`PipelineDescription`] built from
//!    [`VideoConfig`].  A start failure is reported as
//!    [`VideoErrorKind::Start`] and ends the thread; the session stays up.
//! 2. Pulls decoded frames with a short timeout and pushes them into the
//!    [`FrameQueue`].  Frames arriving while the queue is full are dropped.
//! 3. Drains control events between pulls: errors are reported, end of stream
//!    is reported and raises the stream-ended flag so the session supervisor
//!    tears the session down, and QoS reports update the shared receiver
//!    status.
//!
//! [`VideoBridge::stop`] clears the running flag and joins the thread; the
//! thread stops the decoder before it exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use camlink_core::protocol::messages::VIDEO_PORT;
use camlink_core::{PixelFormat, DEFAULT_FRAME_CAPACITY};
use tracing::{debug, error, info, trace, warn};

use super::congestion::{CongestionTracker, SharedStatus};
use super::decoder::{DecodeError, DecoderEvent, VideoDecoder};
use super::pipeline::PipelineDescription;
use crate::application::events::{EventSink, SessionEvent, VideoErrorKind};
use crate::application::frame_queue::FrameQueue;

/// Video stream and bridge settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConfig {
    /// UDP port the RTP stream arrives on.
    pub port: u16,
    /// Jitter buffer latency in milliseconds.
    pub jitter_latency_ms: u32,
    /// Optional output size.
    pub scale: Option<(u32, u32)>,
    pub pixel_format: PixelFormat,
    /// Upper bound for one frame pull.
    pub pull_timeout: Duration,
    /// QoS timestamp gap above which the receiver reports congestion.
    pub qos_jitter_threshold: Duration,
    /// Capacity of the frame queue.
    pub frame_capacity: usize,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            port: VIDEO_PORT,
            jitter_latency_ms: 100,
            scale: None,
            pixel_format: PixelFormat::Rgba,
            pull_timeout: Duration::from_millis(100),
            qos_jitter_threshold: Duration::from_millis(20),
            frame_capacity: DEFAULT_FRAME_CAPACITY,
        }
    }
}

/// Shared handles the bridge thread writes to.
#[derive(Clone)]
pub struct BridgeContext {
    pub config: VideoConfig,
    pub frames: FrameQueue,
    pub status: SharedStatus,
    /// Raised when the decoder reports end of stream.
    pub stream_ended: Arc<AtomicBool>,
    pub events: EventSink<SessionEvent>,
}

/// Handle to a running bridge thread.
pub struct VideoBridge {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl VideoBridge {
    /// Spawns the bridge thread for `decoder`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Thread`] if the thread cannot be spawned.
    pub fn start(decoder: Box<dyn VideoDecoder>, ctx: BridgeContext) -> Result<Self, DecodeError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("camlink-video".to_string())
            .spawn(move || run(decoder, ctx, flag))
            .map_err(DecodeError::Thread)?;
        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// `true` until the bridge thread has exited.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the thread and waits for it without blocking the runtime.
    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => debug!("video bridge joined"),
                Ok(Err(_)) => warn!("video thread panicked"),
                Err(e) => warn!("failed to join video thread: {e}"),
            }
        }
    }

    /// Blocking variant of [`VideoBridge::stop`].
    pub fn stop_blocking(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("video thread panicked");
            }
        }
    }
}

impl Drop for VideoBridge {
    fn drop(&mut self) {
        self.stop_blocking();
    }
}

fn run(mut decoder: Box<dyn VideoDecoder>, ctx: BridgeContext, running: Arc<AtomicBool>) {
    let description = PipelineDescription::from_config(&ctx.config);
    if let Err(e) = decoder.start(&description) {
        error!("failed to start video pipeline: {e}");
        ctx.events.emit(SessionEvent::VideoError {
            kind: VideoErrorKind::Start,
            message: e.to_string(),
        });
        decoder.stop();
        return;
    }
    info!(pipeline = %description, "video pipeline started");

    let mut tracker = CongestionTracker::new(ctx.config.qos_jitter_threshold);

    'pull: while running.load(Ordering::Acquire) {
        if let Some(frame) = decoder.pull_frame(ctx.config.pull_timeout) {
            if !ctx.frames.push(frame) {
                trace!(rejected = ctx.frames.rejected(), "frame queue full; dropping frame");
            }
        }

        while let Some(event) = decoder.poll_event() {
            match event {
                DecoderEvent::Error(message) => {
                    warn!("decoder error: {message}");
                    ctx.events.emit(SessionEvent::VideoError {
                        kind: VideoErrorKind::Decode,
                        message,
                    });
                }
                DecoderEvent::Eos => {
                    info!("video stream ended");
                    // Reported before the flag is raised so the error always
                    // precedes the supervisor's status notification.
                    ctx.events.emit(SessionEvent::VideoError {
                        kind: VideoErrorKind::EndOfStream,
                        message: "video stream ended".to_string(),
                    });
                    ctx.stream_ended.store(true, Ordering::Release);
                    break 'pull;
                }
                DecoderEvent::Qos { timestamp } => {
                    if let Some(status) = tracker.observe(timestamp) {
                        debug!(%status, "receiver status changed");
                        ctx.status.set(status);
                        ctx.events.emit(SessionEvent::CongestionChanged(status));
                    }
                }
            }
        }
    }

    decoder.stop();
    info!("video pipeline stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
