//! The external decoder collaborator.
//!
//! Decoding itself happens outside this crate.  The video bridge only needs
//! to start a pipeline from a [`PipelineDescription`], pull decoded frames,
//! drain control events, and stop the pipeline again.

use std::sync::Arc;
use std::time::Duration;

use camlink_core::VideoFrame;
use thiserror::Error;

use super::pipeline::PipelineDescription;

/// Errors reported by a decoder.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The decoder runtime is not available on this system.
    #[error("decoder unavailable: {0}")]
    Unavailable(String),
    /// The pipeline description was rejected.
    #[error("invalid pipeline: {0}")]
    Pipeline(String),
    /// The pipeline could not change state (e.g. to playing).
    #[error("pipeline state change failed: {0}")]
    StateChange(String),
    /// The bridge thread could not be started.
    #[error("failed to spawn video thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Control events drained from the decoder between frame pulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A pipeline element reported an error.
    Error(String),
    /// The stream ended.
    Eos,
    /// A quality-of-service report carrying the running time of the late
    /// buffer.
    Qos { timestamp: Duration },
}

/// A video decoder driven by the bridge thread.
///
/// All calls come from one thread; implementations need to be `Send` but not
/// `Sync`.
#[cfg_attr(test, mockall::automock)]
pub trait VideoDecoder: Send {
    /// Builds and starts the pipeline.
    fn start(&mut self, pipeline: &PipelineDescription) -> Result<(), DecodeError>;

    /// Waits up to `timeout` for the next decoded frame.
    fn pull_frame(&mut self, timeout: Duration) -> Option<VideoFrame>;

    /// Returns the next pending control event without blocking.
    fn poll_event(&mut self) -> Option<DecoderEvent>;

    /// Stops the pipeline and releases its resources.  Safe to call twice.
    fn stop(&mut self);
}

/// Creates one decoder per session.
pub type DecoderFactory = Arc<dyn Fn() -> Box<dyn VideoDecoder> + Send + Sync>;

/// Stand-in for builds without a decoding backend.
///
/// `start` always fails, so every session reports a
/// [`VideoErrorKind::Start`](crate::VideoErrorKind::Start) error and keeps
/// running without video.
#[derive(Debug, Default)]
pub struct NullDecoder {
    reason: String,
}

impl NullDecoder {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// Factory handing out a fresh `NullDecoder` per session.
    pub fn factory(reason: impl Into<String>) -> DecoderFactory {
        let reason = reason.into();
        Arc::new(move || Box::new(NullDecoder::new(reason.clone())) as Box<dyn VideoDecoder>)
    }
}

impl VideoDecoder for NullDecoder {
    fn start(&mut self, _pipeline: &PipelineDescription) -> Result<(), DecodeError> {
        Err(DecodeError::Unavailable(self.reason.clone()))
    }

    fn pull_frame(&mut self, _timeout: Duration) -> Option<VideoFrame> {
        None
    }

    fn poll_event(&mut self) -> Option<DecoderEvent> {
        None
    }

    fn stop(&mut self) {}
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::video::VideoConfig;

    #[test]
    fn test_null_decoder_refuses_to_start() {
        // Arrange
        let factory = NullDecoder::factory("built without a video backend");
        let mut decoder = factory();
        let pipeline = PipelineDescription::from_config(&VideoConfig::default());

        // Act
        let result = decoder.start(&pipeline);

        // Assert
        match result {
            Err(DecodeError::Unavailable(reason)) => {
                assert_eq!(reason, "built without a video backend")
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
        assert!(decoder.pull_frame(Duration::ZERO).is_none());
        assert!(decoder.poll_event().is_none());
    }
}
