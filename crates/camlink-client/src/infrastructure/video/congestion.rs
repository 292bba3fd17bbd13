//! Receiver congestion status derived from decoder QoS reports.
//!
//! When the decoder reports late buffers, the gap between consecutive QoS
//! timestamps tells how far behind the receiver is.  A gap above the
//! threshold marks the receiver as congested; the status is piggybacked on
//! heartbeat replies so the server can adapt.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camlink_core::ReceiverStatus;

/// Turns a sequence of QoS timestamps into a [`ReceiverStatus`].
#[derive(Debug)]
pub struct CongestionTracker {
    threshold: Duration,
    last: Option<Duration>,
    status: ReceiverStatus,
}

impl CongestionTracker {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            last: None,
            status: ReceiverStatus::Normal,
        }
    }

    /// Feeds one QoS timestamp.  Returns the new status if it changed.
    ///
    /// The first report only sets the baseline.
    pub fn observe(&mut self, timestamp: Duration) -> Option<ReceiverStatus> {
        let previous = self.last.replace(timestamp)?;
        let next = if timestamp.saturating_sub(previous) > self.threshold {
            ReceiverStatus::Congested
        } else {
            ReceiverStatus::Normal
        };
        (next != self.status).then(|| {
            self.status = next;
            next
        })
    }

    pub fn status(&self) -> ReceiverStatus {
        self.status
    }
}

/// Receiver status shared between the video thread and the heartbeat.
#[derive(Debug, Clone)]
pub struct SharedStatus {
    code: Arc<AtomicU16>,
}

impl Default for SharedStatus {
    fn default() -> Self {
        Self {
            code: Arc::new(AtomicU16::new(ReceiverStatus::Normal.code())),
        }
    }
}

impl SharedStatus {
    pub fn get(&self) -> ReceiverStatus {
        ReceiverStatus::try_from(self.code.load(Ordering::Acquire)).unwrap_or_default()
    }

    pub fn set(&self, status: ReceiverStatus) {
        self.code.store(status.code(), Ordering::Release);
    }

    pub fn reset(&self) {
        self.set(ReceiverStatus::Normal);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
