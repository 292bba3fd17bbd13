//! camlink headless client entry point.
//!
//! ```text
//! camlink [--config PATH] discover [--scan-secs N]
//! camlink [--config PATH] connect <IP> <PORT> [--camera N] [--frames N]
//! camlink [--config PATH] init-config
//! ```
//!
//! `discover` runs one scan and prints every server found.  `connect` opens a
//! session, prints the camera list, selects a camera (the given one or the
//! first offered), and consumes decoded frames until Ctrl-C, until `--frames`
//! frames have arrived, or until the session ends.  `init-config` writes the
//! default configuration file.
//!
//! The log level comes from `[client] log_level` in the config file and is
//! overridden by `RUST_LOG`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use camlink_client::infrastructure::storage::config::{load_config, save_config, AppConfig};
use camlink_client::{
    ConnectionManager, DecoderFactory, DiscoveryEvent, DiscoveryService, SessionEvent,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Finds camera servers on the LAN and streams one of their cameras.
#[derive(Debug, Parser)]
#[command(name = "camlink", version)]
struct Cli {
    /// Configuration file; defaults to the platform config directory.
    #[arg(long, global = true, env = "CAMLINK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Listen for server beacons and print the servers found.
    Discover {
        /// Scan duration in seconds; overrides `[discovery] scan_secs`.
        #[arg(long)]
        scan_secs: Option<u64>,
    },
    /// Connect to a server and stream a camera.
    Connect {
        /// Server IP address.
        ip: String,
        /// Server heartbeat (session) port.
        port: u16,
        /// Camera to select; defaults to the first one offered.
        #[arg(long)]
        camera: Option<i32>,
        /// Disconnect after this many frames.
        #[arg(long)]
        frames: Option<u64>,
    },
    /// Write the default configuration file.
    InitConfig,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let loaded = load_config(cli.config.as_deref());

    let default_level = loaded
        .as_ref()
        .map(|c| c.client.log_level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = loaded.context("failed to load configuration")?;

    match cli.command {
        Command::Discover { scan_secs } => discover(&config, scan_secs).await,
        Command::Connect {
            ip,
            port,
            camera,
            frames,
        } => connect(&config, &ip, port, camera, frames).await,
        Command::InitConfig => {
            let path = save_config(&AppConfig::default(), cli.config.as_deref())
                .context("failed to write configuration")?;
            println!("wrote {}", path.display());
            Ok(())
        }
    }
}

async fn discover(config: &AppConfig, scan_secs: Option<u64>) -> anyhow::Result<()> {
    let mut discovery_config = config.discovery_config();
    if let Some(secs) = scan_secs {
        discovery_config.scan_duration = Duration::from_secs(secs);
    }

    let (service, mut events) = DiscoveryService::new(discovery_config);
    let addr = service.start().context("failed to start discovery")?;
    info!("scanning on {addr}");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(DiscoveryEvent::ServersUpdated(servers)) => {
                    if let Some(latest) = servers.last() {
                        println!(
                            "found {} at {}",
                            latest.display_name(),
                            latest.session_addr()
                        );
                    }
                }
                Some(DiscoveryEvent::Active(false)) | None => break,
                Some(DiscoveryEvent::Active(true)) => {}
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    let stopper = tokio::task::spawn_blocking(move || {
        service.stop();
        service.snapshot()
    });
    let servers = stopper.await.context("discovery shutdown failed")?;
    println!("{} server(s) found", servers.len());
    for server in &servers {
        println!("  {}  {}", server.session_addr(), server.display_name());
    }
    Ok(())
}

async fn connect(
    config: &AppConfig,
    ip: &str,
    port: u16,
    camera: Option<i32>,
    frame_limit: Option<u64>,
) -> anyhow::Result<()> {
    let (manager, mut events) = ConnectionManager::new(
        config.session_config(),
        config.video_config(),
        decoder_factory(),
    );
    let frames = manager.frames();
    manager.connect(ip, port).context("failed to start connection")?;

    let mut connected = false;
    let mut received: u64 = 0;
    let outcome = loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(SessionEvent::ConnectionStatus { connected: true, message }) => {
                    connected = true;
                    println!("{message}");
                }
                Some(SessionEvent::ConnectionStatus { connected: false, message }) => {
                    if connected {
                        println!("{message}");
                        break Ok(());
                    }
                    break Err(anyhow::anyhow!(message));
                }
                Some(SessionEvent::CameraListAvailable(cameras)) => {
                    println!("cameras: {cameras:?}");
                    let Some(choice) = camera.or_else(|| cameras.first().copied()) else {
                        break Err(anyhow::anyhow!("server offers no cameras"));
                    };
                    if let Err(e) = manager.select_camera(choice).await {
                        warn!("camera {choice}: {e}");
                    }
                }
                Some(SessionEvent::VideoError { kind, message }) => {
                    warn!(?kind, "video: {message}");
                }
                Some(SessionEvent::CongestionChanged(status)) => {
                    info!("receiver status {status}");
                }
                None => break Ok(()),
            },
            frame = frames.next() => {
                received += 1;
                info!(
                    width = frame.width,
                    height = frame.height,
                    format = %frame.format,
                    "frame {received}"
                );
                if frame_limit.is_some_and(|limit| received >= limit) {
                    break Ok(());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
        }
    };

    manager.shutdown().await;
    println!("{received} frame(s) received, {} dropped", frames.rejected());
    match outcome {
        Ok(()) => Ok(()),
        Err(e) => bail!("connection failed: {e}"),
    }
}

#[cfg(feature = "gstreamer")]
fn decoder_factory() -> DecoderFactory {
    use camlink_client::infrastructure::video::gst::GstDecoder;
    use camlink_client::VideoDecoder;

    std::sync::Arc::new(|| Box::new(GstDecoder::new()) as Box<dyn VideoDecoder>)
}

#[cfg(not(feature = "gstreamer"))]
fn decoder_factory() -> DecoderFactory {
    use camlink_client::infrastructure::video::NullDecoder;

    warn!("built without the `gstreamer` feature; video will not be decoded");
    NullDecoder::factory("camlink was built without the `gstreamer` feature")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
