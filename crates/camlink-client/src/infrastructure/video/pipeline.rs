//! Declarative description of the decode pipeline.
//!
//! The stream is RTP/H.264 over UDP.  The description renders to a
//! `gst-launch` style string:
//!
//! ```text
//! udpsrc port=5000
//!   ! application/x-rtp,media=video,clock-rate=90000,encoding-name=H264
//!   ! rtpjitterbuffer latency=100 ! rtph264depay ! avdec_h264
//!   ! videoconvert [! videoscale ! video/x-raw,width=W,height=H]
//!   ! video/x-raw,format=RGBA ! appsink name=sink
//! ```

use std::fmt;

use camlink_core::PixelFormat;

use super::bridge::VideoConfig;

/// Name of the sink element frames are pulled from.
pub const SINK_NAME: &str = "sink";

/// Everything a decoder needs to build the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDescription {
    pub video_port: u16,
    pub jitter_latency_ms: u32,
    /// Output size; `None` keeps the stream's own size.
    pub scale: Option<(u32, u32)>,
    pub pixel_format: PixelFormat,
    pub sink_name: String,
}

impl PipelineDescription {
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            video_port: config.port,
            jitter_latency_ms: config.jitter_latency_ms,
            scale: config.scale,
            pixel_format: config.pixel_format.clone(),
            sink_name: SINK_NAME.to_string(),
        }
    }

    pub fn to_launch_string(&self) -> String {
        let mut parts = vec![
            format!("udpsrc port={}", self.video_port),
            "application/x-rtp,media=video,clock-rate=90000,encoding-name=H264".to_string(),
            format!("rtpjitterbuffer latency={}", self.jitter_latency_ms),
            "rtph264depay".to_string(),
            "avdec_h264".to_string(),
            "videoconvert".to_string(),
        ];
        if let Some((width, height)) = self.scale {
            parts.push("videoscale".to_string());
            parts.push(format!("video/x-raw,width={width},height={height}"));
        }
        parts.push(format!("video/x-raw,format={}", self.pixel_format));
        parts.push(format!("appsink name={}", self.sink_name));
        parts.join(" ! ")
    }
}

impl fmt::Display for PipelineDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_launch_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_launch_string() {
        // Arrange
        let description = PipelineDescription::from_config(&VideoConfig::default());

        // Act
        let launch = description.to_launch_string();

        // Assert
        assert_eq!(
            launch,
            "udpsrc port=5000 \
             ! application/x-rtp,media=video,clock-rate=90000,encoding-name=H264 \
             ! rtpjitterbuffer latency=100 ! rtph264depay ! avdec_h264 ! videoconvert \
             ! video/x-raw,format=RGBA ! appsink name=sink"
        );
    }

    #[test]
    fn test_scale_inserts_videoscale_before_format_caps() {
        let config = VideoConfig {
            port: 5600,
            scale: Some((640, 480)),
            ..VideoConfig::default()
        };

        let launch = PipelineDescription::from_config(&config).to_launch_string();

        assert!(launch.starts_with("udpsrc port=5600 "));
        assert!(launch.contains(
            "videoconvert ! videoscale ! video/x-raw,width=640,height=480 ! video/x-raw,format=RGBA"
        ));
    }

    #[test]
    fn test_display_matches_launch_string() {
        let description = PipelineDescription::from_config(&VideoConfig::default());
        assert_eq!(description.to_string(), description.to_launch_string());
    }
}
