//! TOML-based configuration for the client.
//!
//! Reads and writes [`AppConfig`] from the platform-appropriate config file
//! unless a path is given explicitly (`camlink --config PATH`):
//! - Windows:  `%APPDATA%\camlink\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/camlink/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/camlink/config.toml`
//!
//! Example:
//!
//! ```toml
//! [client]
//! log_level = "debug"
//!
//! [discovery]
//! scan_secs = 10
//!
//! [session]
//! liveness_threshold_ms = 5000
//!
//! [video]
//! port = 5600
//! scale_width = 1280
//! scale_height = 720
//! ```
//!
//! Every field has a default, so any subset of sections and keys is a valid
//! file and a missing file is the same as an empty one.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use camlink_core::protocol::messages::{DISCOVERY_PORT, VIDEO_PORT};
use camlink_core::{PixelFormat, DEFAULT_FRAME_CAPACITY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::network::connection_manager::SessionConfig;
use crate::infrastructure::network::discovery::DiscoveryConfig;
use crate::infrastructure::video::VideoConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub discovery: DiscoverySection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub video: VideoSection,
}

/// General client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Discovery listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySection {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    #[serde(default = "default_scan_secs")]
    pub scan_secs: u64,
    #[serde(default = "default_discovery_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
}

/// Session timeouts and retry policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSection {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_liveness_threshold_ms")]
    pub liveness_threshold_ms: u64,
    #[serde(default = "default_selection_grace_secs")]
    pub selection_grace_secs: u64,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_select_attempts")]
    pub select_attempts: u32,
    #[serde(default = "default_select_backoff_ms")]
    pub select_backoff_ms: u64,
}

/// Video stream settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoSection {
    #[serde(default = "default_video_port")]
    pub port: u16,
    #[serde(default = "default_jitter_latency_ms")]
    pub jitter_latency_ms: u32,
    /// Output width; only used together with `scale_height`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_height: Option<u32>,
    #[serde(default = "default_pixel_format")]
    pub pixel_format: PixelFormat,
    #[serde(default = "default_pull_timeout_ms")]
    pub pull_timeout_ms: u64,
    #[serde(default = "default_qos_jitter_threshold_ms")]
    pub qos_jitter_threshold_ms: u64,
    #[serde(default = "default_frame_capacity")]
    pub frame_capacity: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}
fn default_scan_secs() -> u64 {
    5
}
fn default_discovery_recv_timeout_ms() -> u64 {
    1000
}
fn default_connect_timeout_ms() -> u64 {
    3000
}
fn default_handshake_timeout_ms() -> u64 {
    5000
}
fn default_recv_timeout_ms() -> u64 {
    1000
}
fn default_heartbeat_interval_ms() -> u64 {
    500
}
fn default_liveness_threshold_ms() -> u64 {
    3000
}
fn default_selection_grace_secs() -> u64 {
    60
}
fn default_ack_timeout_ms() -> u64 {
    1000
}
fn default_select_attempts() -> u32 {
    3
}
fn default_select_backoff_ms() -> u64 {
    100
}
fn default_video_port() -> u16 {
    VIDEO_PORT
}
fn default_jitter_latency_ms() -> u32 {
    100
}
fn default_pixel_format() -> PixelFormat {
    PixelFormat::Rgba
}
fn default_pull_timeout_ms() -> u64 {
    100
}
fn default_qos_jitter_threshold_ms() -> u64 {
    20
}
fn default_frame_capacity() -> usize {
    DEFAULT_FRAME_CAPACITY
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_discovery_port(),
            scan_secs: default_scan_secs(),
            recv_timeout_ms: default_discovery_recv_timeout_ms(),
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            liveness_threshold_ms: default_liveness_threshold_ms(),
            selection_grace_secs: default_selection_grace_secs(),
            ack_timeout_ms: default_ack_timeout_ms(),
            select_attempts: default_select_attempts(),
            select_backoff_ms: default_select_backoff_ms(),
        }
    }
}

impl Default for VideoSection {
    fn default() -> Self {
        Self {
            port: default_video_port(),
            jitter_latency_ms: default_jitter_latency_ms(),
            scale_width: None,
            scale_height: None,
            pixel_format: default_pixel_format(),
            pull_timeout_ms: default_pull_timeout_ms(),
            qos_jitter_threshold_ms: default_qos_jitter_threshold_ms(),
            frame_capacity: default_frame_capacity(),
        }
    }
}

// ── Runtime conversions ───────────────────────────────────────────────────────

impl AppConfig {
    pub fn discovery_config(&self) -> DiscoveryConfig {
        let d = &self.discovery;
        DiscoveryConfig {
            bind_address: d.bind_address,
            port: d.port,
            scan_duration: Duration::from_secs(d.scan_secs),
            recv_timeout: Duration::from_millis(d.recv_timeout_ms),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let s = &self.session;
        SessionConfig {
            connect_timeout: Duration::from_millis(s.connect_timeout_ms),
            handshake_timeout: Duration::from_millis(s.handshake_timeout_ms),
            recv_timeout: Duration::from_millis(s.recv_timeout_ms),
            heartbeat_interval: Duration::from_millis(s.heartbeat_interval_ms),
            liveness_threshold: Duration::from_millis(s.liveness_threshold_ms),
            selection_grace: Duration::from_secs(s.selection_grace_secs),
            ack_timeout: Duration::from_millis(s.ack_timeout_ms),
            select_attempts: s.select_attempts,
            select_backoff: Duration::from_millis(s.select_backoff_ms),
        }
    }

    pub fn video_config(&self) -> VideoConfig {
        let v = &self.video;
        VideoConfig {
            port: v.port,
            jitter_latency_ms: v.jitter_latency_ms,
            scale: v.scale_width.zip(v.scale_height),
            pixel_format: v.pixel_format.clone(),
            pull_timeout: Duration::from_millis(v.pull_timeout_ms),
            qos_jitter_threshold: Duration::from_millis(v.qos_jitter_threshold_ms),
            frame_capacity: v.frame_capacity,
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(platform_config_dir()
        .ok_or(ConfigError::NoPlatformConfigDir)?
        .join("config.toml"))
}

/// Loads `AppConfig` from `path`, or from the default location when `path` is
/// `None`.  A missing file yields `AppConfig::default()`.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Writes `config` to `path` (or the default location), creating parent
/// directories as needed.  Returns the path written.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Resolves the platform config directory including the `camlink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("camlink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("camlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("camlink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("camlink_test_{}", Uuid::new_v4()))
    }

    #[test]
    fn test_default_runtime_configs_match_component_defaults() {
        // Arrange
        let cfg = AppConfig::default();

        // Act / Assert
        assert_eq!(cfg.session_config(), SessionConfig::default());
        assert_eq!(cfg.video_config(), VideoConfig::default());
        let discovery = cfg.discovery_config();
        assert_eq!(discovery.port, 37020);
        assert_eq!(discovery.scan_duration, Duration::from_secs(5));
    }

    #[test]
    fn test_empty_toml_is_default() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_overrides_only_given_keys() {
        // Arrange
        let toml_str = r#"
[session]
liveness_threshold_ms = 5000

[video]
pixel_format = "BGRA"
"#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.session.liveness_threshold_ms, 5000);
        assert_eq!(cfg.session.heartbeat_interval_ms, 500);
        assert_eq!(cfg.video.pixel_format, PixelFormat::Bgra);
        assert_eq!(cfg.client.log_level, "info");
    }

    #[test]
    fn test_scale_needs_both_dimensions() {
        let mut cfg = AppConfig::default();
        cfg.video.scale_width = Some(640);
        assert_eq!(cfg.video_config().scale, None);

        cfg.video.scale_height = Some(480);
        assert_eq!(cfg.video_config().scale, Some((640, 480)));
    }

    #[test]
    fn test_unset_scale_is_omitted_from_toml() {
        let toml_str = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        assert!(!toml_str.contains("scale_width"));
        assert!(toml_str.contains("[session]"));
    }

    #[test]
    fn test_invalid_toml_returns_parse_error() {
        // Arrange
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[[[ not valid toml").unwrap();

        // Act
        let result = load_config(Some(&path));

        // Assert
        assert!(matches!(result, Err(ConfigError::Parse(_))));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let path = temp_dir().join("config.toml");
        let cfg = load_config(Some(&path)).expect("missing file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip_creates_directories() {
        // Arrange
        let dir = temp_dir();
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.client.log_level = "debug".to_string();
        cfg.discovery.port = 47020;
        cfg.video.scale_width = Some(1280);
        cfg.video.scale_height = Some(720);

        // Act
        let written = save_config(&cfg, Some(&path)).expect("save");
        let loaded = load_config(Some(&written)).expect("load");

        // Assert
        assert_eq!(written, path);
        assert_eq!(loaded, cfg);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_config_file_path_ends_with_config_toml() {
        if let Ok(path) = config_file_path() {
            assert!(
                path.ends_with("camlink/config.toml"),
                "unexpected config path {path:?}"
            );
        }
    }
}
