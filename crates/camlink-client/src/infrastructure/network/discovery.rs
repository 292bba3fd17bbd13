//! UDP beacon-based server discovery.
//!
//! Streaming servers periodically broadcast a small JSON beacon on the
//! discovery port (default 37020):
//!
//! ```json
//! {"heartbeat_port": 6000, "name": "garage"}
//! ```
//!
//! A scan binds a UDP socket on that port and, for a bounded scan window
//! (default 5 s), records every beacon whose `(sender ip, heartbeat_port)`
//! pair has not been seen yet.  Each new server produces a
//! [`DiscoveryEvent::ServersUpdated`] carrying the complete list so far.
//!
//! The listener runs on a dedicated thread to avoid blocking the Tokio
//! runtime with synchronous socket I/O.
//!
//! # Read timeout
//!
//! The socket is configured with a short read timeout (default 1 s, never
//! longer than what is left of the scan window).  `recv_from` therefore
//! blocks for at most that long before returning a timeout error, at which
//! point the loop checks the stop flag and the deadline.  A scan is over at
//! most one read timeout after its window closes, even when no beacon ever
//! arrives.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use camlink_core::protocol::messages::DISCOVERY_PORT;
use camlink_core::{parse_beacon, ServerRecord, ServerSet};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::events::{DiscoveryEvent, EventSink};

/// Largest datagram accepted as a beacon.
const MAX_BEACON_SIZE: usize = 4096;

/// Pause after a non-timeout receive error so a persistent error does not spin.
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for discovery service operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The bound socket could not be configured.
    #[error("failed to configure discovery socket: {0}")]
    Socket(#[source] std::io::Error),
    /// The listener thread could not be started.
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Settings for a discovery scan.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Local address to bind the listener on.
    pub bind_address: IpAddr,
    /// UDP port servers broadcast on.  `0` lets the OS choose (tests).
    pub port: u16,
    /// How long one scan listens before stopping on its own.
    pub scan_duration: Duration,
    /// Upper bound for a single `recv_from` call.
    pub recv_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DISCOVERY_PORT,
            scan_duration: Duration::from_secs(5),
            recv_timeout: Duration::from_secs(1),
        }
    }
}

/// A running scan: its stop flag and listener thread.
struct ScanHandle {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Listens for server beacons and keeps the deduplicated server list.
pub struct DiscoveryService {
    config: DiscoveryConfig,
    servers: Arc<Mutex<ServerSet>>,
    events: EventSink<DiscoveryEvent>,
    scan: Mutex<Option<ScanHandle>>,
}

impl DiscoveryService {
    /// Creates an idle service and the receiver for its events.
    pub fn new(config: DiscoveryConfig) -> (Self, mpsc::UnboundedReceiver<DiscoveryEvent>) {
        let (events, rx) = EventSink::channel();
        let service = Self {
            config,
            servers: Arc::new(Mutex::new(ServerSet::new())),
            events,
            scan: Mutex::new(None),
        };
        (service, rx)
    }

    /// Starts a scan and returns the bound local address.
    ///
    /// A scan that is already running is stopped (and joined) first.  The
    /// discovered set is kept; use [`DiscoveryService::refresh`] to clear it.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::BindFailed`] if the socket cannot be bound.
    pub fn start(&self) -> Result<SocketAddr, DiscoveryError> {
        let mut scan = self.scan_slot();
        stop_scan(scan.take());

        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let socket =
            UdpSocket::bind(addr).map_err(|source| DiscoveryError::BindFailed { addr, source })?;
        socket
            .set_read_timeout(Some(read_timeout(self.config.recv_timeout)))
            .map_err(DiscoveryError::Socket)?;
        let local = socket.local_addr().map_err(DiscoveryError::Socket)?;

        let running = Arc::new(AtomicBool::new(true));
        let listener = Listener {
            socket,
            running: Arc::clone(&running),
            servers: Arc::clone(&self.servers),
            events: self.events.clone(),
            deadline: Instant::now() + self.config.scan_duration,
            recv_timeout: self.config.recv_timeout,
        };

        let thread = std::thread::Builder::new()
            .name("camlink-discovery".to_string())
            .spawn(move || listener.run())
            .map_err(DiscoveryError::Spawn)?;

        info!(
            "discovery listening on UDP {local} for {:?}",
            self.config.scan_duration
        );
        *scan = Some(ScanHandle { running, thread });
        Ok(local)
    }

    /// Stops the running scan, if any, and waits for its thread to exit.
    pub fn stop(&self) {
        let handle = self.scan_slot().take();
        stop_scan(handle);
    }

    /// Clears the discovered set and starts a fresh scan.
    pub fn refresh(&self) -> Result<SocketAddr, DiscoveryError> {
        self.stop();
        self.server_set().clear();
        self.events.emit(DiscoveryEvent::ServersUpdated(Vec::new()));
        self.start()
    }

    /// The deduplicated servers seen so far, in discovery order.
    pub fn snapshot(&self) -> Vec<ServerRecord> {
        self.server_set().to_vec()
    }

    /// `true` while a scan is listening.
    pub fn is_active(&self) -> bool {
        self.scan_slot()
            .as_ref()
            .is_some_and(|scan| scan.running.load(Ordering::Acquire) && !scan.thread.is_finished())
    }

    fn scan_slot(&self) -> MutexGuard<'_, Option<ScanHandle>> {
        self.scan.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server_set(&self) -> MutexGuard<'_, ServerSet> {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_scan(handle: Option<ScanHandle>) {
    if let Some(scan) = handle {
        scan.running.store(false, Ordering::Release);
        if scan.thread.join().is_err() {
            warn!("discovery thread panicked");
        }
    }
}

/// `set_read_timeout` rejects a zero duration.
fn read_timeout(timeout: Duration) -> Duration {
    timeout.max(Duration::from_millis(1))
}

/// State moved onto the discovery thread.
struct Listener {
    socket: UdpSocket,
    running: Arc<AtomicBool>,
    servers: Arc<Mutex<ServerSet>>,
    events: EventSink<DiscoveryEvent>,
    deadline: Instant,
    recv_timeout: Duration,
}

impl Listener {
    fn run(self) {
        self.events.emit(DiscoveryEvent::Active(true));
        let mut buf = vec![0u8; MAX_BEACON_SIZE];

        while self.running.load(Ordering::Acquire) {
            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                debug!("discovery scan window elapsed");
                break;
            }
            if let Err(e) = self
                .socket
                .set_read_timeout(Some(read_timeout(self.recv_timeout.min(remaining))))
            {
                warn!("failed to adjust discovery read timeout: {e}");
            }

            let (len, src) = match self.socket.recv_from(&mut buf) {
                Ok(pair) => pair,
                Err(e) if is_timeout_error(&e) => continue,
                Err(e) => {
                    warn!("discovery recv error: {e}");
                    std::thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            };

            self.handle_datagram(&buf[..len], src);
        }

        self.running.store(false, Ordering::Release);
        self.events.emit(DiscoveryEvent::Active(false));
        info!("discovery scan stopped");
    }

    fn handle_datagram(&self, datagram: &[u8], src: SocketAddr) {
        let record = match parse_beacon(datagram, src.ip()) {
            Ok(record) => record,
            Err(e) => {
                debug!("discarding datagram from {src}: {e}");
                return;
            }
        };

        let key = record.key();
        let updated = {
            let mut servers = self.servers.lock().unwrap_or_else(PoisonError::into_inner);
            servers.insert(record).then(|| servers.to_vec())
        };

        if let Some(list) = updated {
            info!(server = %key, "discovered server");
            self.events.emit(DiscoveryEvent::ServersUpdated(list));
        }
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config(scan: Duration) -> DiscoveryConfig {
        DiscoveryConfig {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            scan_duration: scan,
            recv_timeout: Duration::from_millis(100),
        }
    }

    #[test]
    fn test_is_timeout_error_recognises_timed_out() {
        // Arrange
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");

        // Act / Assert
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_recognises_would_block() {
        let e = std::io::Error::new(std::io::ErrorKind::WouldBlock, "would block");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_other_errors() {
        let e = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_timeout_error(&e));
    }

    #[test]
    fn test_read_timeout_never_zero() {
        assert_eq!(read_timeout(Duration::ZERO), Duration::from_millis(1));
        assert_eq!(read_timeout(Duration::from_secs(1)), Duration::from_secs(1));
    }

    #[test]
    fn test_default_config_uses_discovery_port() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.port, 37020);
        assert_eq!(config.scan_duration, Duration::from_secs(5));
        assert_eq!(config.recv_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_start_reports_active_and_stop_joins() {
        // Arrange
        let (service, mut rx) = DiscoveryService::new(loopback_config(Duration::from_secs(30)));

        // Act
        let addr = service.start().expect("bind loopback");
        let active_while_running = service.is_active();
        service.stop();

        // Assert
        assert_ne!(addr.port(), 0);
        assert!(active_while_running);
        assert!(!service.is_active());
        assert_eq!(rx.try_recv().unwrap(), DiscoveryEvent::Active(true));
        assert_eq!(rx.try_recv().unwrap(), DiscoveryEvent::Active(false));
        assert!(rx.try_recv().is_err(), "Active(false) must be emitted once");
    }

    #[test]
    fn test_duplicate_beacons_are_reported_once() {
        // Arrange
        let (service, mut rx) = DiscoveryService::new(loopback_config(Duration::from_secs(30)));
        let addr = service.start().expect("bind loopback");
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        // Act
        for _ in 0..3 {
            sender
                .send_to(br#"{"heartbeat_port": 6000, "name": "cam"}"#, addr)
                .unwrap();
        }
        sender.send_to(b"not json", addr).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        service.stop();

        // Assert
        let updates: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| matches!(e, DiscoveryEvent::ServersUpdated(_)))
            .collect();
        assert_eq!(updates.len(), 1);
        let snapshot = service.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].heartbeat_port, 6000);
        assert_eq!(snapshot[0].name, "cam");
    }

    #[test]
    fn test_second_start_restarts_scan() {
        // Arrange
        let (service, mut rx) = DiscoveryService::new(loopback_config(Duration::from_secs(30)));
        service.start().unwrap();

        // Act
        service.start().unwrap();
        service.stop();

        // Assert
        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            events,
            vec![
                DiscoveryEvent::Active(true),
                DiscoveryEvent::Active(false),
                DiscoveryEvent::Active(true),
                DiscoveryEvent::Active(false),
            ]
        );
    }

    #[test]
    fn test_scan_ends_on_its_own() {
        // Arrange
        let (service, _rx) = DiscoveryService::new(loopback_config(Duration::from_millis(150)));
        let started = Instant::now();

        // Act
        service.start().unwrap();
        while service.is_active() && started.elapsed() < Duration::from_secs(2) {
            std::thread::sleep(Duration::from_millis(10));
        }

        // Assert
        assert!(!service.is_active());
        assert!(started.elapsed() < Duration::from_millis(150 + 100 + 200));
    }

    #[test]
    fn test_refresh_clears_known_servers() {
        // Arrange
        let (service, mut rx) = DiscoveryService::new(loopback_config(Duration::from_secs(30)));
        let addr = service.start().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(br#"{"heartbeat_port": 6000}"#, addr).unwrap();
        std::thread::sleep(Duration::from_millis(200));
        assert_eq!(service.snapshot().len(), 1);

        // Act
        service.refresh().unwrap();
        service.stop();

        // Assert
        assert!(service.snapshot().is_empty());
        let cleared = std::iter::from_fn(|| rx.try_recv().ok())
            .any(|e| e == DiscoveryEvent::ServersUpdated(Vec::new()));
        assert!(cleared);
    }
}
