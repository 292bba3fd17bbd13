//! Heartbeat monitor.
//!
//! Once a camera has been selected, the server sends a heartbeat payload over
//! the session stream at a regular interval and the client answers each one
//! with its receiver status code (`"200"` or `"300"`).  The monitor runs
//! inside the session supervisor task and returns a [`HeartbeatExit`] when
//! the session has to end; the supervisor performs the teardown.
//!
//! # Readiness gate
//!
//! Heartbeats are only enforced after a camera selection has completed.
//! Until then the monitor is dormant: it neither reads the stream nor checks
//! staleness.  A session that stays unselected longer than
//! `selection_grace` counts as timed out.  The gate is also closed while a
//! selection is in flight so the acknowledgment byte is never consumed here.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tracing::{debug, trace, warn};

use super::connection_manager::SessionConfig;
use super::session::{Liveness, TransportLock};
use crate::infrastructure::video::SharedStatus;

/// Bytes read per heartbeat.
const HEARTBEAT_BUFFER: usize = 16;

/// Why the heartbeat monitor returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// A disconnect was requested or the transport was taken.
    Stopped,
    /// No successful exchange within the liveness threshold, or no camera
    /// selected within the selection grace period.
    TimedOut,
    /// The server closed the stream or a read failed.
    Closed,
    /// Answering a heartbeat failed.
    SendFailed,
    /// The decoder reported end of stream.
    StreamEnded,
}

impl HeartbeatExit {
    /// Status message reported when the session ends for this reason.
    pub fn reason(self) -> &'static str {
        match self {
            HeartbeatExit::Stopped => "disconnected",
            HeartbeatExit::TimedOut => "heartbeat timed out",
            HeartbeatExit::Closed => "connection closed",
            HeartbeatExit::SendFailed => "heartbeat send failed",
            HeartbeatExit::StreamEnded => "video stream ended",
        }
    }
}

/// What the monitor needs from the session.
pub struct HeartbeatContext<'a> {
    pub config: &'a SessionConfig,
    pub transport: &'a TransportLock,
    pub liveness: &'a Liveness,
    pub stop: &'a AtomicBool,
    pub stream_ended: &'a AtomicBool,
    pub status: &'a SharedStatus,
}

enum Beat {
    Answered,
    Missed,
    Skipped,
}

/// Runs until the session has to end.
pub async fn run(ctx: &HeartbeatContext<'_>) -> HeartbeatExit {
    let mut buf = [0u8; HEARTBEAT_BUFFER];

    loop {
        if ctx.stop.load(Ordering::Acquire) {
            return HeartbeatExit::Stopped;
        }
        if ctx.stream_ended.load(Ordering::Acquire) {
            return HeartbeatExit::StreamEnded;
        }

        if !ctx.liveness.is_armed() {
            if !ctx.liveness.was_ever_armed()
                && ctx.liveness.since_session_start() > ctx.config.selection_grace
            {
                warn!(
                    "no camera selected within {:?}; giving up on session",
                    ctx.config.selection_grace
                );
                return HeartbeatExit::TimedOut;
            }
            sleep(ctx.config.heartbeat_interval).await;
            continue;
        }

        let stale = ctx.liveness.since_last_exchange();
        if stale > ctx.config.liveness_threshold {
            warn!("no heartbeat for {stale:?}");
            return HeartbeatExit::TimedOut;
        }

        let beat = {
            let mut transport = ctx.transport.lock().await;
            let Some(stream) = transport.as_mut() else {
                return HeartbeatExit::Stopped;
            };
            if !ctx.liveness.is_armed() {
                Beat::Skipped
            } else {
                match timeout(ctx.config.recv_timeout, stream.read(&mut buf)).await {
                    Err(_) => Beat::Missed,
                    Ok(Ok(0)) => {
                        debug!("server closed the session stream");
                        return HeartbeatExit::Closed;
                    }
                    Ok(Err(e)) => {
                        debug!("heartbeat receive failed: {e}");
                        return HeartbeatExit::Closed;
                    }
                    Ok(Ok(n)) => {
                        let status = ctx.status.get();
                        trace!(bytes = n, %status, "heartbeat received");
                        if let Err(e) = stream.write_all(&status.wire_bytes()).await {
                            warn!("failed to answer heartbeat: {e}");
                            return HeartbeatExit::SendFailed;
                        }
                        ctx.liveness.touch();
                        Beat::Answered
                    }
                }
            }
        };

        match beat {
            Beat::Missed => trace!("heartbeat receive timed out"),
            Beat::Answered | Beat::Skipped => sleep(ctx.config.heartbeat_interval).await,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
