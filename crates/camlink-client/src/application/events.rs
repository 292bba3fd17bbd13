//! Notifications emitted by the client engine.
//!
//! # Invocation context
//!
//! Events are sent on unbounded `tokio::sync::mpsc` channels.  Sending never
//! blocks the emitting task and is always done after any internal lock has
//! been released, so the consumer may call back into the engine (for example
//! `ConnectionManager::select_camera` in response to
//! [`SessionEvent::CameraListAvailable`]) without deadlocking.
//!
//! | Event | Emitted from |
//! |---|---|
//! | [`DiscoveryEvent::Active`] | discovery thread, at scan start and end |
//! | [`DiscoveryEvent::ServersUpdated`] | discovery thread, or the caller of `refresh` |
//! | [`SessionEvent::ConnectionStatus`] | connect task, session supervisor, or the caller of `connect`/`disconnect`/`select_camera` |
//! | [`SessionEvent::CameraListAvailable`] | connect task |
//! | [`SessionEvent::VideoError`] | video thread or session supervisor |
//! | [`SessionEvent::CongestionChanged`] | video thread |

use std::fmt;

use camlink_core::{ReceiverStatus, ServerRecord};
use tokio::sync::mpsc;
use tracing::trace;

/// Events produced by the discovery service.
#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    /// The discovered set changed; carries the full deduplicated list.
    ServersUpdated(Vec<ServerRecord>),
    /// A scan started (`true`) or ended (`false`).
    Active(bool),
}

/// What went wrong in the video pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoErrorKind {
    /// The decoder could not start the pipeline.
    Start,
    /// The decoder reported an error while running.
    Decode,
    /// The stream ended.  The session is torn down after this event.
    EndOfStream,
}

/// Events produced by the session engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Connection status change or result of an operation, with a
    /// human-readable message.
    ConnectionStatus { connected: bool, message: String },
    /// Cameras offered by the server, in server order.
    CameraListAvailable(Vec<i32>),
    /// The video pipeline reported a problem.
    VideoError { kind: VideoErrorKind, message: String },
    /// The receiver status carried by heartbeat replies changed.
    CongestionChanged(ReceiverStatus),
}

impl SessionEvent {
    pub fn status(connected: bool, message: impl Into<String>) -> Self {
        SessionEvent::ConnectionStatus {
            connected,
            message: message.into(),
        }
    }
}

/// Sending half of an event channel.
pub struct EventSink<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for EventSink<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: fmt::Debug> EventSink<E> {
    /// Creates a sink and the receiver the consumer drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers `event`.  A dropped receiver is not an error; the event is
    /// discarded.
    pub fn emit(&self, event: E) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            trace!("event receiver dropped; discarding {event:?}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_delivers_in_order() {
        // Arrange
        let (sink, mut rx) = EventSink::channel();

        // Act
        sink.emit(SessionEvent::status(true, "connected to 10.0.0.1"));
        sink.emit(SessionEvent::CameraListAvailable(vec![2, 5, 7]));

        // Assert
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::ConnectionStatus {
                connected: true,
                message: "connected to 10.0.0.1".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::CameraListAvailable(vec![2, 5, 7])
        );
    }

    #[test]
    fn test_emit_after_receiver_dropped_does_not_panic() {
        let (sink, rx) = EventSink::<DiscoveryEvent>::channel();
        drop(rx);
        sink.emit(DiscoveryEvent::Active(true));
    }

    #[test]
    fn test_cloned_sinks_share_one_receiver() {
        let (sink, mut rx) = EventSink::channel();
        let other = sink.clone();

        sink.emit(DiscoveryEvent::Active(true));
        other.emit(DiscoveryEvent::Active(false));

        assert_eq!(rx.try_recv().unwrap(), DiscoveryEvent::Active(true));
        assert_eq!(rx.try_recv().unwrap(), DiscoveryEvent::Active(false));
    }
}
