//! GStreamer-backed [`VideoDecoder`] (cargo feature `gstreamer`).
//!
//! Requires the GStreamer runtime with the `good` and `libav` plugin sets:
//!
//! ```bash
//! sudo apt install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev \
//!                  gstreamer1.0-plugins-good gstreamer1.0-libav
//! ```

use std::time::Duration;

use camlink_core::{PixelFormat, VideoFrame};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, warn};

use super::decoder::{DecodeError, DecoderEvent, VideoDecoder};
use super::pipeline::PipelineDescription;

/// Buffers the appsink keeps before dropping the oldest.
const SINK_MAX_BUFFERS: u32 = 5;

struct Running {
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
    bus: gst::Bus,
}

/// Decodes the RTP/H.264 stream with a `gst::parse::launch` pipeline.
#[derive(Default)]
pub struct GstDecoder {
    running: Option<Running>,
}

impl GstDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoDecoder for GstDecoder {
    fn start(&mut self, description: &PipelineDescription) -> Result<(), DecodeError> {
        self.stop();
        gst::init().map_err(|e| DecodeError::Unavailable(e.to_string()))?;

        let launch = description.to_launch_string();
        debug!("launching pipeline: {launch}");
        let pipeline = gst::parse::launch(&launch)
            .map_err(|e| DecodeError::Pipeline(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| DecodeError::Pipeline("launch string is not a pipeline".to_string()))?;

        let sink = pipeline
            .by_name(&description.sink_name)
            .ok_or_else(|| {
                DecodeError::Pipeline(format!("no element named {}", description.sink_name))
            })?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| {
                DecodeError::Pipeline(format!("{} is not an appsink", description.sink_name))
            })?;
        sink.set_drop(true);
        sink.set_max_buffers(SINK_MAX_BUFFERS);

        let bus = pipeline
            .bus()
            .ok_or_else(|| DecodeError::Pipeline("pipeline has no bus".to_string()))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(DecodeError::StateChange(e.to_string()));
        }

        self.running = Some(Running {
            pipeline,
            sink,
            bus,
        });
        Ok(())
    }

    fn pull_frame(&mut self, timeout: Duration) -> Option<VideoFrame> {
        let running = self.running.as_ref()?;
        let sample = running.sink.try_pull_sample(clock_time(timeout))?;

        let caps = sample.caps()?;
        let info = match gst_video::VideoInfo::from_caps(caps) {
            Ok(info) => info,
            Err(e) => {
                warn!("sample without video caps: {e}");
                return None;
            }
        };
        let buffer = sample.buffer()?;
        let map = match buffer.map_readable() {
            Ok(map) => map,
            Err(e) => {
                warn!("failed to map video buffer: {e}");
                return None;
            }
        };

        let format: PixelFormat = info.format().to_string().parse().unwrap_or(PixelFormat::Rgba);
        Some(VideoFrame::new(
            info.width(),
            info.height(),
            format,
            map.as_slice().to_vec(),
        ))
    }

    fn poll_event(&mut self) -> Option<DecoderEvent> {
        let running = self.running.as_ref()?;
        loop {
            let message = running.bus.pop_filtered(&[
                gst::MessageType::Error,
                gst::MessageType::Eos,
                gst::MessageType::Qos,
            ])?;
            match message.view() {
                gst::MessageView::Error(err) => {
                    let detail = err
                        .debug()
                        .map(|d| format!("{} ({d})", err.error()))
                        .unwrap_or_else(|| err.error().to_string());
                    return Some(DecoderEvent::Error(detail));
                }
                gst::MessageView::Eos(_) => return Some(DecoderEvent::Eos),
                gst::MessageView::Qos(qos) => {
                    let (_live, _running_time, _stream_time, timestamp, _duration) = qos.get();
                    if let Some(ts) = timestamp {
                        return Some(DecoderEvent::Qos {
                            timestamp: Duration::from_nanos(ts.nseconds()),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            if let Err(e) = running.pipeline.set_state(gst::State::Null) {
                warn!("failed to stop pipeline: {e}");
            }
        }
    }
}

impl Drop for GstDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Converts a pull timeout, saturating at the largest clock time.
fn clock_time(timeout: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
