//! Camera selection over the session stream.
//!
//! The request is a newline-terminated JSON object:
//!
//! ```text
//! {"camera_index":3}\n
//! ```
//!
//! and the server answers with the single byte `'1'`.  A missing or wrong
//! answer is retried a fixed number of times with a short pause in between.
//! The heartbeat readiness gate is closed for the whole exchange and opened
//! again only when the selection succeeds.

use std::time::Duration;

use camlink_core::{check_select_ack, encode_select_request, ConnectionState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::connection_manager::{SessionError, TimeoutKind, TransportOp};
use super::session::{Liveness, TransportLock};

/// What the selector needs from the session.
pub struct SelectorContext<'a> {
    pub transport: &'a TransportLock,
    pub liveness: &'a Liveness,
    pub ack_timeout: Duration,
    pub attempts: u32,
    pub backoff: Duration,
}

/// Sends the selection for `camera_index` until it is acknowledged.
///
/// # Errors
///
/// - [`SessionError::SelectionFailed`] when every attempt went unanswered or
///   was answered wrongly.
/// - [`SessionError::NotConnected`] if the transport is gone.
pub async fn select(ctx: &SelectorContext<'_>, camera_index: i32) -> Result<(), SessionError> {
    let request = encode_select_request(camera_index)?;
    let attempts = ctx.attempts.max(1);
    ctx.liveness.disarm();

    for attempt in 1..=attempts {
        match exchange(ctx, &request).await {
            Ok(()) => {
                info!(camera = camera_index, attempt, "camera selection acknowledged");
                ctx.liveness.arm();
                return Ok(());
            }
            Err(e @ SessionError::NotConnected { .. }) => return Err(e),
            Err(e) => warn!(camera = camera_index, attempt, "camera selection attempt failed: {e}"),
        }
        if attempt < attempts {
            sleep(ctx.backoff).await;
        }
    }

    Err(SessionError::SelectionFailed { attempts })
}

/// One send-and-wait round.
async fn exchange(ctx: &SelectorContext<'_>, request: &[u8]) -> Result<(), SessionError> {
    let mut transport = ctx.transport.lock().await;
    let stream = transport.as_mut().ok_or(SessionError::NotConnected {
        actual: ConnectionState::Disconnected,
    })?;

    stream
        .write_all(request)
        .await
        .map_err(|source| SessionError::Transport {
            op: TransportOp::Send,
            source,
        })?;
    debug!(bytes = request.len(), "selection request sent");

    match timeout(ctx.ack_timeout, stream.read_u8()).await {
        Err(_) => Err(SessionError::Timeout(TimeoutKind::Ack)),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(SessionError::Closed),
        Ok(Err(source)) => Err(SessionError::Transport {
            op: TransportOp::Receive,
            source,
        }),
        Ok(Ok(byte)) => check_select_ack(byte).map_err(SessionError::from),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
