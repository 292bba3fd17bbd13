//! Session-scoped shared state.
//!
//! - [`SessionSlot`] – the single-flight guard.  At most one session may be
//!   connecting or connected at a time; acquisition is a compare-and-swap and
//!   release happens when the returned [`SlotGuard`] is dropped.
//! - [`SessionState`] – the fields of the current session, guarded by the
//!   connection manager's `std::sync::Mutex`.
//! - [`Liveness`] – the heartbeat readiness gate and the time of the last
//!   successful heartbeat exchange.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use camlink_core::ConnectionState;
use tokio::net::TcpStream;

/// The session transport, shared by the heartbeat monitor and the camera
/// selector.  `None` once the session has been torn down.
pub type TransportLock = tokio::sync::Mutex<Option<TcpStream>>;

// ── Single-flight slot ────────────────────────────────────────────────────────

/// Test-and-set guard that admits one live session.
///
/// Clones share the same flag.  [`SessionSlot::global`] is the process-wide
/// instance used by `ConnectionManager::new`.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    taken: Arc<AtomicBool>,
}

static GLOBAL_SLOT: OnceLock<SessionSlot> = OnceLock::new();

impl SessionSlot {
    /// Creates an isolated slot, independent of the process-wide one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide slot.
    pub fn global() -> SessionSlot {
        GLOBAL_SLOT.get_or_init(SessionSlot::new).clone()
    }

    /// Claims the slot.  Returns `None` if it is already held.
    pub fn try_acquire(&self) -> Option<SlotGuard> {
        self.taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard {
                taken: Arc::clone(&self.taken),
            })
    }

    pub fn is_held(&self) -> bool {
        self.taken.load(Ordering::Acquire)
    }
}

/// Holds the [`SessionSlot`] until dropped.
#[derive(Debug)]
pub struct SlotGuard {
    taken: Arc<AtomicBool>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.taken.store(false, Ordering::Release);
    }
}

// ── Session fields ────────────────────────────────────────────────────────────

/// Mutable fields of the current session.
#[derive(Debug, Default)]
pub struct SessionState {
    pub state: ConnectionState,
    pub server_ip: Option<IpAddr>,
    pub cameras: Vec<i32>,
    pub selected_camera: Option<i32>,
    pub connected_at: Option<Instant>,
    slot: Option<SlotGuard>,
}

impl SessionState {
    /// Enters `Connecting`, taking ownership of the slot guard.
    pub fn begin(&mut self, guard: SlotGuard) {
        self.state = ConnectionState::Connecting;
        self.slot = Some(guard);
    }

    /// Enters `Connected` with the handshake results.
    pub fn install(&mut self, ip: IpAddr, cameras: Vec<i32>) {
        self.state = ConnectionState::Connected;
        self.server_ip = Some(ip);
        self.cameras = cameras;
        self.selected_camera = None;
        self.connected_at = Some(Instant::now());
    }

    /// Returns to `Idle` and releases the slot.
    pub fn reset(&mut self) {
        *self = SessionState::default();
    }
}

// ── Liveness ──────────────────────────────────────────────────────────────────

/// Heartbeat readiness gate and liveness clock.
///
/// The gate is armed by a successful camera selection and disarmed while a
/// selection is in flight.  While disarmed the heartbeat monitor does not
/// read the transport.
#[derive(Debug)]
pub struct Liveness {
    armed: AtomicBool,
    ever_armed: AtomicBool,
    last_exchange: Mutex<Instant>,
    session_start: Mutex<Instant>,
}

impl Default for Liveness {
    fn default() -> Self {
        let now = Instant::now();
        Self {
            armed: AtomicBool::new(false),
            ever_armed: AtomicBool::new(false),
            last_exchange: Mutex::new(now),
            session_start: Mutex::new(now),
        }
    }
}

impl Liveness {
    /// Resets the gate for a newly connected session.
    pub fn reset(&self) {
        self.armed.store(false, Ordering::Release);
        self.ever_armed.store(false, Ordering::Release);
        let now = Instant::now();
        *lock(&self.last_exchange) = now;
        *lock(&self.session_start) = now;
    }

    /// Opens the gate and restarts the liveness clock.
    pub fn arm(&self) {
        self.touch();
        self.ever_armed.store(true, Ordering::Release);
        self.armed.store(true, Ordering::Release);
    }

    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// `true` once any camera selection has succeeded in this session.
    pub fn was_ever_armed(&self) -> bool {
        self.ever_armed.load(Ordering::Acquire)
    }

    /// Records a successful heartbeat exchange.
    pub fn touch(&self) {
        *lock(&self.last_exchange) = Instant::now();
    }

    pub fn since_last_exchange(&self) -> Duration {
        lock(&self.last_exchange).elapsed()
    }

    pub fn since_session_start(&self) -> Duration {
        lock(&self.session_start).elapsed()
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
