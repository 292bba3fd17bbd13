//! Scripted in-memory decoder.
//!
//! `MockDecoder` stands in for a real decoder where none is available: in
//! integration tests, and in builds without the `gstreamer` feature.  Tests
//! queue frames and control events ahead of time and inspect what the bridge
//! did afterwards.  Clones share the same script, so a test can keep one
//! handle while the bridge owns another:
//!
//! ```
//! use camlink_client::infrastructure::video::mock::MockDecoder;
//! use camlink_client::infrastructure::video::DecoderEvent;
//!
//! let decoder = MockDecoder::new();
//! let factory = decoder.factory();
//! decoder.push_event(DecoderEvent::Eos);
//! # let _ = factory;
//! assert_eq!(decoder.start_count(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camlink_core::VideoFrame;

use super::decoder::{DecodeError, DecoderEvent, DecoderFactory, VideoDecoder};
use super::pipeline::PipelineDescription;

#[derive(Debug, Default)]
struct Script {
    frames: VecDeque<VideoFrame>,
    events: VecDeque<DecoderEvent>,
    start_error: Option<String>,
    launches: Vec<String>,
    stops: usize,
}

/// A decoder that replays queued frames and events.
#[derive(Debug, Clone, Default)]
pub struct MockDecoder {
    script: Arc<Mutex<Script>>,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory handing out clones of this decoder.
    pub fn factory(&self) -> DecoderFactory {
        let decoder = self.clone();
        Arc::new(move || Box::new(decoder.clone()) as Box<dyn VideoDecoder>)
    }

    pub fn push_frame(&self, frame: VideoFrame) {
        self.script().frames.push_back(frame);
    }

    pub fn push_event(&self, event: DecoderEvent) {
        self.script().events.push_back(event);
    }

    /// Makes every following `start` fail with `message`.
    pub fn fail_start(&self, message: impl Into<String>) {
        self.script().start_error = Some(message.into());
    }

    /// Launch strings of every successful `start`.
    pub fn launches(&self) -> Vec<String> {
        self.script().launches.clone()
    }

    pub fn start_count(&self) -> usize {
        self.script().launches.len()
    }

    pub fn stop_count(&self) -> usize {
        self.script().stops
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl VideoDecoder for MockDecoder {
    fn start(&mut self, pipeline: &PipelineDescription) -> Result<(), DecodeError> {
        let mut script = self.script();
        if let Some(message) = &script.start_error {
            return Err(DecodeError::Pipeline(message.clone()));
        }
        script.launches.push(pipeline.to_launch_string());
        Ok(())
    }

    /// Returns the next queued frame, or sleeps for `timeout` when none is
    /// queued.
    fn pull_frame(&mut self, timeout: Duration) -> Option<VideoFrame> {
        let frame = self.script().frames.pop_front();
        if frame.is_none() {
            std::thread::sleep(timeout);
        }
        frame
    }

    fn poll_event(&mut self) -> Option<DecoderEvent> {
        self.script().events.pop_front()
    }

    fn stop(&mut self) {
        self.script().stops += 1;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use camlink_core::PixelFormat;

    use super::*;
    use crate::infrastructure::video::VideoConfig;

    #[test]
    fn test_replays_frames_then_times_out() {
        // Arrange
        let mock = MockDecoder::new();
        mock.push_frame(VideoFrame::new(1, 1, PixelFormat::Rgba, vec![1, 2, 3, 4]));
        let mut decoder = mock.clone();

        // Act
        let first = decoder.pull_frame(Duration::from_millis(1));
        let second = decoder.pull_frame(Duration::from_millis(1));

        // Assert
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[test]
    fn test_start_records_launch_string() {
        let mock = MockDecoder::new();
        let mut decoder = (mock.factory())();

        decoder
            .start(&PipelineDescription::from_config(&VideoConfig::default()))
            .unwrap();
        decoder.stop();

        assert_eq!(mock.start_count(), 1);
        assert!(mock.launches()[0].starts_with("udpsrc port=5000"));
        assert_eq!(mock.stop_count(), 1);
    }

    #[test]
    fn test_fail_start_returns_pipeline_error() {
        let mock = MockDecoder::new();
        mock.fail_start("boom");
        let mut decoder = mock.clone();

        let result = decoder.start(&PipelineDescription::from_config(&VideoConfig::default()));

        assert!(matches!(result, Err(DecodeError::Pipeline(m)) if m == "boom"));
        assert_eq!(mock.start_count(), 0);
    }

    #[test]
    fn test_events_are_fifo() {
        let mock = MockDecoder::new();
        mock.push_event(DecoderEvent::Error("x".into()));
        mock.push_event(DecoderEvent::Eos);
        let mut decoder = mock.clone();

        assert_eq!(decoder.poll_event(), Some(DecoderEvent::Error("x".into())));
        assert_eq!(decoder.poll_event(), Some(DecoderEvent::Eos));
        assert_eq!(decoder.poll_event(), None);
    }
}
