//! The session state machine.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──handshake ok──▶ Connected
//!  ▲                    │                            │
//!  │              failure/cancel           disconnect / heartbeat exit
//!  │                    ▼                            ▼
//!  └────────────────── (cleanup) ◀──────────── Disconnected
//! ```
//!
//! # Connecting
//!
//! [`ConnectionManager::connect`] claims the single-flight [`SessionSlot`]
//! and returns immediately; the attempt runs on a spawned task:
//!
//! 1. Parse the address and open a TCP stream, bounded by `connect_timeout`.
//! 2. Send the handshake token `CLIENT_HANDSHAKE`.
//! 3. Accumulate the server's reply until it parses as a JSON object with a
//!    `cameras` list, bounded by `handshake_timeout`.
//! 4. Commit `Connected`, spawn the session supervisor, and emit
//!    `ConnectionStatus{connected: true}` followed by `CameraListAvailable`.
//!
//! Any failure drops the stream, returns to `Idle`, releases the slot, and
//! emits exactly one `ConnectionStatus{connected: false}` with a
//! human-readable reason.  The cancellation flag is polled between steps.
//!
//! # Session supervisor
//!
//! One tokio task per connected session.  It starts the video bridge, runs
//! the heartbeat monitor until the session has to end, and then performs the
//! teardown: transport closed, video bridge stopped and joined, state back to
//! `Idle`, slot released.  If the session ended on its own the supervisor
//! emits the reason; a requested disconnect is reported by
//! [`ConnectionManager::disconnect`] instead, so every session ends with
//! exactly one status notification.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use camlink_core::protocol::messages::HANDSHAKE_TOKEN;
use camlink_core::{decode_camera_list, ConnectionState, ProtocolError, ReceiverStatus};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::camera_selector::{self, SelectorContext};
use super::heartbeat::{self, HeartbeatContext, HeartbeatExit};
use super::session::{Liveness, SessionSlot, SessionState, TransportLock};
use crate::application::events::{EventSink, SessionEvent, VideoErrorKind};
use crate::application::frame_queue::FrameQueue;
use crate::infrastructure::video::{
    BridgeContext, DecodeError, DecoderFactory, SharedStatus, VideoBridge, VideoConfig,
};

/// Largest handshake reply accepted before it is treated as malformed.
const MAX_HANDSHAKE_RESPONSE: usize = 64 * 1024;

// ── Errors ────────────────────────────────────────────────────────────────────

/// The socket operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOp {
    Connect,
    Handshake,
    Send,
    Receive,
}

impl fmt::Display for TransportOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportOp::Connect => "connect",
            TransportOp::Handshake => "handshake send",
            TransportOp::Send => "send",
            TransportOp::Receive => "receive",
        })
    }
}

/// The bounded wait that expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    Connect,
    Handshake,
    Heartbeat,
    Ack,
}

impl fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TimeoutKind::Connect => "connect",
            TimeoutKind::Handshake => "camera list receive",
            TimeoutKind::Heartbeat => "heartbeat",
            TimeoutKind::Ack => "selection acknowledgment",
        })
    }
}

/// Coarse grouping of [`SessionError`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transport,
    Protocol,
    Timeout,
    State,
    Decode,
    Cancelled,
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server address is not an IP address.
    #[error("invalid server address: {0:?}")]
    InvalidAddress(String),
    /// A socket operation failed.
    #[error("{op} failed: {source}")]
    Transport {
        op: TransportOp,
        #[source]
        source: std::io::Error,
    },
    /// The server closed the stream.
    #[error("connection closed by server")]
    Closed,
    /// The server sent something unexpected.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("{0} timed out")]
    Timeout(TimeoutKind),
    /// Another session is already connecting or connected.
    #[error("a session is already connecting or connected")]
    Busy,
    /// The operation needs a connected session.
    #[error("not connected (state: {actual:?})")]
    NotConnected { actual: ConnectionState },
    #[error("decoder error: {0}")]
    Decode(#[from] DecodeError),
    #[error("connection attempt cancelled")]
    Cancelled,
    /// No acknowledgment after every attempt.
    #[error("camera selection failed after {attempts} attempt(s)")]
    SelectionFailed { attempts: u32 },
}

impl SessionError {
    /// The human-readable reason reported in `ConnectionStatus`.
    pub fn status_message(&self) -> &'static str {
        match self {
            SessionError::InvalidAddress(_) => "invalid server address",
            SessionError::Transport { op, .. } => match op {
                TransportOp::Connect => "failed to connect to server",
                TransportOp::Handshake => "failed to send handshake",
                TransportOp::Send => "failed to send to server",
                TransportOp::Receive => "connection closed by server",
            },
            SessionError::Closed => "connection closed by server",
            SessionError::Protocol(_) => "invalid server response",
            SessionError::Timeout(kind) => match kind {
                TimeoutKind::Connect => "connection to server timed out",
                TimeoutKind::Handshake => "timed out waiting for camera list",
                TimeoutKind::Heartbeat => "heartbeat timed out",
                TimeoutKind::Ack => "camera selection failed",
            },
            SessionError::Busy => "a connection is already active",
            SessionError::NotConnected { .. } => "not connected",
            SessionError::Decode(_) => "video decoder error",
            SessionError::Cancelled => "connection attempt cancelled",
            SessionError::SelectionFailed { .. } => "camera selection failed",
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            SessionError::InvalidAddress(_)
            | SessionError::Transport { .. }
            | SessionError::Closed => ErrorClass::Transport,
            SessionError::Protocol(_) | SessionError::SelectionFailed { .. } => {
                ErrorClass::Protocol
            }
            SessionError::Timeout(_) => ErrorClass::Timeout,
            SessionError::Busy | SessionError::NotConnected { .. } => ErrorClass::State,
            SessionError::Decode(_) => ErrorClass::Decode,
            SessionError::Cancelled => ErrorClass::Cancelled,
        }
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Timeouts and retry policy of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    /// Bound for receiving the camera list after the handshake.
    pub handshake_timeout: Duration,
    /// Bound for one heartbeat receive.
    pub recv_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Longest gap between successful heartbeat exchanges.
    pub liveness_threshold: Duration,
    /// Longest time a session may stay connected without a camera selection.
    pub selection_grace: Duration,
    pub ack_timeout: Duration,
    pub select_attempts: u32,
    pub select_backoff: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(5),
            recv_timeout: Duration::from_secs(1),
            heartbeat_interval: Duration::from_millis(500),
            liveness_threshold: Duration::from_secs(3),
            selection_grace: Duration::from_secs(60),
            ack_timeout: Duration::from_secs(1),
            select_attempts: 3,
            select_backoff: Duration::from_millis(100),
        }
    }
}

/// Read-only view of the session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub server_ip: Option<IpAddr>,
    pub cameras: Vec<i32>,
    pub selected_camera: Option<i32>,
}

// ── Manager ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Tasks {
    connect: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

struct Shared {
    config: SessionConfig,
    video: VideoConfig,
    slot: SessionSlot,
    session: Mutex<SessionState>,
    transport: TransportLock,
    liveness: Liveness,
    cancel: AtomicBool,
    stop: AtomicBool,
    stream_ended: Arc<AtomicBool>,
    status: SharedStatus,
    frames: FrameQueue,
    decoders: DecoderFactory,
    events: EventSink<SessionEvent>,
    /// Serializes camera selections.
    selection: tokio::sync::Mutex<()>,
    tasks: Mutex<Tasks>,
    /// Signalled whenever a session leaves `Disconnected`.
    torn_down: Notify,
}

/// Owns the client session: connect, camera selection, teardown.
///
/// Methods that spawn tasks must be called from within a Tokio runtime.
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Creates a manager guarded by the process-wide [`SessionSlot`].
    pub fn new(
        config: SessionConfig,
        video: VideoConfig,
        decoders: DecoderFactory,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        Self::with_slot(SessionSlot::global(), config, video, decoders)
    }

    /// Creates a manager guarded by `slot`.
    pub fn with_slot(
        slot: SessionSlot,
        config: SessionConfig,
        video: VideoConfig,
        decoders: DecoderFactory,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = EventSink::channel();
        let frames = FrameQueue::new(video.frame_capacity);
        let shared = Shared {
            config,
            video,
            slot,
            session: Mutex::new(SessionState::default()),
            transport: TransportLock::new(None),
            liveness: Liveness::default(),
            cancel: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            stream_ended: Arc::new(AtomicBool::new(false)),
            status: SharedStatus::default(),
            frames,
            decoders,
            events,
            selection: tokio::sync::Mutex::new(()),
            tasks: Mutex::new(Tasks::default()),
            torn_down: Notify::new(),
        };
        (
            Self {
                shared: Arc::new(shared),
            },
            rx,
        )
    }

    /// Starts connecting to `ip:port` in the background.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] (and emits a failure status) if a
    /// session is already connecting or connected.
    pub fn connect(&self, ip: &str, port: u16) -> Result<(), SessionError> {
        let shared = &self.shared;
        let Some(guard) = shared.slot.try_acquire() else {
            let err = SessionError::Busy;
            warn!(server = ip, port, "connect rejected: {err}");
            shared
                .events
                .emit(SessionEvent::status(false, err.status_message()));
            return Err(err);
        };

        {
            let mut session = shared.session();
            session.begin(guard);
            shared.cancel.store(false, Ordering::Release);
        }
        info!(server = ip, port, "connecting");

        let task_shared = Arc::clone(shared);
        let ip = ip.to_string();
        let mut tasks = shared.tasks();
        let previous_connect = tasks.connect.take();
        let previous_supervisor = tasks.supervisor.take();
        tasks.connect = Some(tokio::spawn(async move {
            for handle in [previous_connect, previous_supervisor].into_iter().flatten() {
                if let Err(e) = handle.await {
                    warn!("previous session task failed: {e}");
                }
            }
            task_shared.run_connect(ip, port).await;
        }));
        Ok(())
    }

    /// Asks an in-progress connect attempt to give up.
    ///
    /// Best effort: a blocking step already under way finishes (or times out)
    /// before the flag is seen.
    pub fn cancel_connect(&self) {
        let session = self.shared.session();
        if session.state == ConnectionState::Connecting {
            debug!("cancelling connect attempt");
            self.shared.cancel.store(true, Ordering::Release);
        }
    }

    /// Ends the session and waits for its supervisor to finish.
    ///
    /// Idempotent.  While connecting this only cancels the attempt.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        let was_connected = {
            let mut session = shared.session();
            match session.state {
                ConnectionState::Connected => {
                    session.state = ConnectionState::Disconnected;
                    shared.stop.store(true, Ordering::Release);
                    true
                }
                ConnectionState::Connecting => {
                    shared.cancel.store(true, Ordering::Release);
                    false
                }
                ConnectionState::Idle | ConnectionState::Disconnected => false,
            }
        };

        if was_connected {
            // The heartbeat may hold the transport for one receive; the
            // supervisor closes it in that case.
            if let Ok(mut transport) = shared.transport.try_lock() {
                transport.take();
            }
        }

        let supervisor = shared.tasks().supervisor.take();
        if let Some(handle) = supervisor {
            if let Err(e) = handle.await {
                error!("session supervisor failed: {e}");
            }
        }

        if was_connected {
            {
                let mut session = shared.session();
                if session.state == ConnectionState::Disconnected {
                    session.reset();
                }
            }
            shared.torn_down.notify_waiters();
            info!("disconnected");
            shared.events.emit(SessionEvent::status(false, "disconnected"));
        } else {
            // Another caller or the supervisor owns the teardown.
            shared.wait_for_teardown().await;
        }
    }

    /// Selects `camera_index` on the connected server.
    ///
    /// On failure a "camera selection failed" status is emitted and the
    /// session is disconnected.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotConnected`] if no session is connected.
    /// - [`SessionError::SelectionFailed`] if the server never acknowledged.
    pub async fn select_camera(&self, camera_index: i32) -> Result<(), SessionError> {
        let shared = &self.shared;
        let selection = shared.selection.lock().await;
        shared.require_connected()?;

        let ctx = SelectorContext {
            transport: &shared.transport,
            liveness: &shared.liveness,
            ack_timeout: shared.config.ack_timeout,
            attempts: shared.config.select_attempts,
            backoff: shared.config.select_backoff,
        };
        match camera_selector::select(&ctx, camera_index).await {
            Ok(()) => {
                {
                    let mut session = shared.session();
                    if session.state == ConnectionState::Connected {
                        session.selected_camera = Some(camera_index);
                    }
                }
                shared.events.emit(SessionEvent::status(
                    true,
                    format!("camera {camera_index} selected"),
                ));
                Ok(())
            }
            Err(e) => {
                warn!(camera = camera_index, "camera selection failed: {e}");
                shared
                    .events
                    .emit(SessionEvent::status(false, "camera selection failed"));
                drop(selection);
                self.disconnect().await;
                Err(e)
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.session().state
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.shared.session();
        SessionSnapshot {
            state: session.state,
            server_ip: session.server_ip,
            cameras: session.cameras.clone(),
            selected_camera: session.selected_camera,
        }
    }

    /// The status code carried by heartbeat replies.
    pub fn receiver_status(&self) -> ReceiverStatus {
        self.shared.status.get()
    }

    /// Consumer handle for decoded frames.
    pub fn frames(&self) -> FrameQueue {
        self.shared.frames.clone()
    }

    /// `true` while a connect task or session supervisor has not finished.
    pub fn has_pending_tasks(&self) -> bool {
        let tasks = self.shared.tasks();
        let pending = [&tasks.connect, &tasks.supervisor]
            .into_iter()
            .flatten()
            .any(|handle| !handle.is_finished());
        pending
    }

    /// Cancels any connect attempt, waits for it, and disconnects.
    ///
    /// Call this before dropping the manager: dropping only raises the stop
    /// flags and leaves the background tasks to wind down unobserved.
    pub async fn shutdown(&self) {
        self.cancel_connect();
        let connect = self.shared.tasks().connect.take();
        if let Some(handle) = connect {
            if let Err(e) = handle.await {
                error!("connect task failed: {e}");
            }
        }
        self.disconnect().await;
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if self.has_pending_tasks() {
            warn!("connection manager dropped without shutdown(); session tasks left to wind down");
        }
        // Background tasks notice these flags and wind down on their own.
        self.shared.cancel.store(true, Ordering::Release);
        self.shared.stop.store(true, Ordering::Release);
    }
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn require_connected(&self) -> Result<(), SessionError> {
        match self.session().state {
            ConnectionState::Connected => Ok(()),
            actual => Err(SessionError::NotConnected { actual }),
        }
    }

    /// Returns once the session is no longer `Disconnected`.
    async fn wait_for_teardown(&self) {
        loop {
            let notified = self.torn_down.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.session().state != ConnectionState::Disconnected {
                return;
            }
            notified.await;
        }
    }

    fn check_cancelled(&self) -> Result<(), SessionError> {
        if self.cancel.load(Ordering::Acquire) {
            Err(SessionError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn run_connect(self: Arc<Self>, ip: String, port: u16) {
        let result = self.establish(&ip, port).await;
        match result {
            Ok((stream, addr, cameras)) => self.install(stream, addr, cameras).await,
            Err(e) => self.fail_connect(e),
        }
    }

    async fn establish(
        &self,
        ip: &str,
        port: u16,
    ) -> Result<(TcpStream, IpAddr, Vec<i32>), SessionError> {
        let addr: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| SessionError::InvalidAddress(ip.to_string()))?;
        self.check_cancelled()?;

        let target = SocketAddr::new(addr, port);
        let mut stream = match timeout(self.config.connect_timeout, TcpStream::connect(target)).await
        {
            Err(_) => return Err(SessionError::Timeout(TimeoutKind::Connect)),
            Ok(Err(source)) => {
                return Err(SessionError::Transport {
                    op: TransportOp::Connect,
                    source,
                })
            }
            Ok(Ok(stream)) => stream,
        };
        debug!(%target, "tcp connected");
        self.check_cancelled()?;

        stream
            .write_all(HANDSHAKE_TOKEN)
            .await
            .map_err(|source| SessionError::Transport {
                op: TransportOp::Handshake,
                source,
            })?;
        self.check_cancelled()?;

        let (cameras, trailing) =
            timeout(self.config.handshake_timeout, read_camera_list(&mut stream))
                .await
                .map_err(|_| SessionError::Timeout(TimeoutKind::Handshake))??;
        if trailing > 0 {
            debug!(%target, bytes = trailing, "discarding bytes after the camera list");
        }
        self.check_cancelled()?;

        debug!(%target, ?cameras, "handshake complete");
        Ok((stream, addr, cameras))
    }

    async fn install(self: Arc<Self>, stream: TcpStream, ip: IpAddr, cameras: Vec<i32>) {
        self.stop.store(false, Ordering::Release);
        self.stream_ended.store(false, Ordering::Release);
        self.status.reset();
        self.frames.clear();
        self.liveness.reset();
        *self.transport.lock().await = Some(stream);

        let (ready_tx, ready_rx) = oneshot::channel();
        let committed = {
            let mut tasks = self.tasks();
            let mut session = self.session();
            if session.state != ConnectionState::Connecting || self.cancel.load(Ordering::Acquire)
            {
                false
            } else {
                session.install(ip, cameras.clone());
                let supervisor = Arc::clone(&self);
                tasks.supervisor = Some(tokio::spawn(supervisor.supervise(ready_rx)));
                true
            }
        };

        if !committed {
            self.transport.lock().await.take();
            self.fail_connect(SessionError::Cancelled);
            return;
        }

        info!(server = %ip, ?cameras, "connected");
        self.events
            .emit(SessionEvent::status(true, format!("connected to {ip}")));
        self.events.emit(SessionEvent::CameraListAvailable(cameras));
        // The supervisor only starts once the connect notifications are out.
        let _ = ready_tx.send(());
    }

    fn fail_connect(&self, err: SessionError) {
        warn!("connection attempt failed: {err}");
        {
            let mut session = self.session();
            if session.state == ConnectionState::Connecting {
                session.reset();
            }
        }
        self.events
            .emit(SessionEvent::status(false, err.status_message()));
    }

    async fn supervise(self: Arc<Self>, ready: oneshot::Receiver<()>) {
        // A dropped sender means the connect task ended early; run anyway so
        // the session is torn down.
        let _ = ready.await;

        let bridge = self.start_video();
        let exit = heartbeat::run(&HeartbeatContext {
            config: &self.config,
            transport: &self.transport,
            liveness: &self.liveness,
            stop: &self.stop,
            stream_ended: &self.stream_ended,
            status: &self.status,
        })
        .await;
        debug!(?exit, "heartbeat monitor exited");

        self.end_session(exit, bridge).await;
    }

    fn start_video(&self) -> Option<VideoBridge> {
        let decoder = (self.decoders)();
        let ctx = BridgeContext {
            config: self.video.clone(),
            frames: self.frames.clone(),
            status: self.status.clone(),
            stream_ended: Arc::clone(&self.stream_ended),
            events: self.events.clone(),
        };
        match VideoBridge::start(decoder, ctx) {
            Ok(bridge) => Some(bridge),
            Err(e) => {
                error!("failed to start video bridge: {e}");
                self.events.emit(SessionEvent::VideoError {
                    kind: VideoErrorKind::Start,
                    message: e.to_string(),
                });
                None
            }
        }
    }

    async fn end_session(&self, exit: HeartbeatExit, bridge: Option<VideoBridge>) {
        let claimed = {
            let mut session = self.session();
            if session.state == ConnectionState::Connected {
                session.state = ConnectionState::Disconnected;
                true
            } else {
                false
            }
        };

        if let Some(mut stream) = self.transport.lock().await.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("transport shutdown: {e}");
            }
        }
        if let Some(bridge) = bridge {
            bridge.stop().await;
        }
        self.liveness.disarm();
        self.status.reset();

        {
            let mut session = self.session();
            if session.state == ConnectionState::Disconnected {
                session.reset();
            }
        }
        self.torn_down.notify_waiters();

        if claimed {
            warn!("session ended: {}", exit.reason());
            self.events
                .emit(SessionEvent::status(false, exit.reason()));
        }
    }
}

/// Reads until the buffered bytes form the camera list reply.
///
/// Returns the cameras and the number of bytes received after the reply.
async fn read_camera_list<R>(stream: &mut R) -> Result<(Vec<i32>, usize), SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|source| SessionError::Transport {
                op: TransportOp::Receive,
                source,
            })?;
        if n == 0 {
            return Err(SessionError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);

        match decode_camera_list(&buf) {
            Ok((cameras, consumed)) => return Ok((cameras, buf.len() - consumed)),
            Err(ProtocolError::InsufficientData { .. }) if buf.len() < MAX_HANDSHAKE_RESPONSE => {}
            Err(e) => return Err(e.into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    use super::*;
    use crate::infrastructure::video::mock::MockDecoder;

    fn manager(config: SessionConfig) -> (ConnectionManager, mpsc::UnboundedReceiver<SessionEvent>) {
        ConnectionManager::with_slot(
            SessionSlot::new(),
            config,
            VideoConfig::default(),
            MockDecoder::new().factory(),
        )
    }

    async fn next_status(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> (bool, String) {
        loop {
            let event = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("event expected")
                .expect("channel open");
            if let SessionEvent::ConnectionStatus { connected, message } = event {
                return (connected, message);
            }
        }
    }

    #[test]
    fn test_status_messages_per_failure_class() {
        // Arrange
        let refused = SessionError::Transport {
            op: TransportOp::Connect,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };

        // Act / Assert
        assert_eq!(refused.status_message(), "failed to connect to server");
        assert_eq!(refused.class(), ErrorClass::Transport);
        assert_eq!(
            SessionError::InvalidAddress("x".into()).status_message(),
            "invalid server address"
        );
        assert_eq!(
            SessionError::Timeout(TimeoutKind::Connect).status_message(),
            "connection to server timed out"
        );
        assert_eq!(
            SessionError::Timeout(TimeoutKind::Handshake).status_message(),
            "timed out waiting for camera list"
        );
        assert_eq!(SessionError::Closed.status_message(), "connection closed by server");
        assert_eq!(
            SessionError::from(ProtocolError::MissingCameraList).status_message(),
            "invalid server response"
        );
        assert_eq!(
            SessionError::Cancelled.status_message(),
            "connection attempt cancelled"
        );
        assert_eq!(SessionError::Busy.class(), ErrorClass::State);
    }

    #[test]
    fn test_default_session_config() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.heartbeat_interval, Duration::from_millis(500));
        assert_eq!(config.liveness_threshold, Duration::from_secs(3));
        assert_eq!(config.select_attempts, 3);
        assert_eq!(config.select_backoff, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_invalid_address_fails_and_returns_to_idle() {
        // Arrange
        let (manager, mut rx) = manager(SessionConfig::default());

        // Act
        assert_ok!(manager.connect("not-an-ip", 4000));
        let status = next_status(&mut rx).await;

        // Assert
        assert_eq!(status, (false, "invalid server address".to_string()));
        assert_eq!(manager.state(), ConnectionState::Idle);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_select_camera_requires_connection() {
        let (manager, _rx) = manager(SessionConfig::default());

        let result = manager.select_camera(1).await;

        assert!(matches!(
            result,
            Err(SessionError::NotConnected {
                actual: ConnectionState::Idle
            })
        ));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_emits_nothing() {
        let (manager, mut rx) = manager(SessionConfig::default());

        manager.disconnect().await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_handshake_reply_in_segments_is_accumulated() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut token = [0u8; 16];
            socket.read_exact(&mut token).await.unwrap();
            socket.write_all(br#"{"cameras": [2,"#).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
            socket.write_all(br#" 5, 7]}"#).await.unwrap();
            (token, socket)
        });
        let (manager, mut rx) = manager(SessionConfig::default());

        // Act
        manager.connect("127.0.0.1", port).unwrap();
        let status = next_status(&mut rx).await;
        let cameras = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
        let (token, _socket) = server.await.unwrap();

        // Assert
        assert_eq!(&token, b"CLIENT_HANDSHAKE");
        assert_eq!(status, (true, "connected to 127.0.0.1".to_string()));
        assert_eq!(cameras, Some(SessionEvent::CameraListAvailable(vec![2, 5, 7])));
        assert_eq!(manager.snapshot().cameras, vec![2, 5, 7]);
        manager.shutdown().await;
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn test_reply_without_cameras_is_invalid_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut token = [0u8; 16];
            socket.read_exact(&mut token).await.unwrap();
            socket.write_all(br#"{"status": "ok"}"#).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
        });
        let (manager, mut rx) = manager(SessionConfig::default());

        manager.connect("127.0.0.1", port).unwrap();
        let status = next_status(&mut rx).await;

        assert_eq!(status, (false, "invalid server response".to_string()));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_peer_closing_during_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut token = [0u8; 16];
            let _ = socket.read_exact(&mut token).await;
        });
        let (manager, mut rx) = manager(SessionConfig::default());

        manager.connect("127.0.0.1", port).unwrap();
        let status = next_status(&mut rx).await;

        assert_eq!(status, (false, "connection closed by server".to_string()));
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_bytes_after_camera_list_are_counted() {
        // Arrange: the reply and an early heartbeat arrive in one read.
        let mut stream = tokio_test::io::Builder::new()
            .read(br#"{"cameras": [4]}ping"#)
            .build();

        // Act
        let (cameras, trailing) = read_camera_list(&mut stream).await.unwrap();

        // Assert
        assert_eq!(cameras, vec![4]);
        assert_eq!(trailing, 4);
    }

    #[tokio::test]
    async fn test_camera_list_split_across_reads_has_no_trailing_bytes() {
        let mut stream = tokio_test::io::Builder::new()
            .read(br#"{"cameras":"#)
            .read(br#" [1, 2]}"#)
            .build();

        let (cameras, trailing) = read_camera_list(&mut stream).await.unwrap();

        assert_eq!(cameras, vec![1, 2]);
        assert_eq!(trailing, 0);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_no_pending_tasks() {
        // Arrange
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut token = [0u8; 16];
            socket.read_exact(&mut token).await.unwrap();
            socket.write_all(br#"{"cameras": [1]}"#).await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });
        let (manager, mut rx) = manager(SessionConfig::default());
        manager.connect("127.0.0.1", port).unwrap();
        assert!(next_status(&mut rx).await.0);
        let pending_while_connected = manager.has_pending_tasks();

        // Act
        manager.shutdown().await;

        // Assert
        assert!(pending_while_connected);
        assert!(!manager.has_pending_tasks());
    }

    #[tokio::test]
    async fn test_silent_server_times_out_waiting_for_camera_list() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });
        let (manager, mut rx) = manager(SessionConfig {
            handshake_timeout: Duration::from_millis(100),
            ..SessionConfig::default()
        });

        manager.connect("127.0.0.1", port).unwrap();
        let status = next_status(&mut rx).await;

        assert_eq!(status, (false, "timed out waiting for camera list".to_string()));
        manager.shutdown().await;
    }
}
