//! Shared producer/consumer handle around [`FrameBuffer`].
//!
//! The video thread pushes synchronously; the renderer either polls with
//! [`FrameQueue::try_pop`] or awaits [`FrameQueue::next`].  The lock is held
//! only for the push or pop itself.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use camlink_core::{FrameBuffer, VideoFrame};
use tokio::sync::Notify;

struct Inner {
    buffer: Mutex<FrameBuffer>,
    available: Notify,
}

/// Cloneable handle to the bounded frame buffer of a client.
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<Inner>,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(FrameBuffer::new(capacity)),
                available: Notify::new(),
            }),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, FrameBuffer> {
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `frame`, or drops it if the buffer is full.
    ///
    /// Returns `true` if the frame was queued.
    pub fn push(&self, frame: VideoFrame) -> bool {
        let accepted = self.buffer().push(frame);
        if accepted {
            self.inner.available.notify_one();
        }
        accepted
    }

    /// Takes the oldest queued frame without waiting.
    pub fn try_pop(&self) -> Option<VideoFrame> {
        self.buffer().pop()
    }

    /// Waits for the next frame.
    pub async fn next(&self) -> VideoFrame {
        loop {
            if let Some(frame) = self.try_pop() {
                return frame;
            }
            self.inner.available.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.buffer().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buffer().capacity()
    }

    /// Frames dropped because the consumer fell behind.
    pub fn rejected(&self) -> u64 {
        self.buffer().rejected()
    }

    pub fn clear(&self) {
        self.buffer().clear();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use camlink_core::PixelFormat;

    use super::*;

    fn make_frame(tag: u8) -> VideoFrame {
        VideoFrame::new(1, 1, PixelFormat::Rgba, vec![tag; 4])
    }

    #[test]
    fn test_push_fifteen_frames_keeps_ten() {
        // Arrange
        let queue = FrameQueue::new(10);

        // Act
        let accepted = (0..15).filter(|&i| queue.push(make_frame(i))).count();

        // Assert
        assert_eq!(accepted, 10);
        assert_eq!(queue.len(), 10);
        assert_eq!(queue.rejected(), 5);
    }

    #[tokio::test]
    async fn test_next_wakes_when_frame_is_pushed_later() {
        // Arrange
        let queue = FrameQueue::new(4);
        let producer = queue.clone();

        // Act
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(make_frame(9));
        });
        let frame = tokio::time::timeout(Duration::from_secs(2), queue.next())
            .await
            .expect("frame must arrive");
        handle.await.unwrap();

        // Assert
        assert_eq!(frame.data[0], 9);
    }

    #[tokio::test]
    async fn test_next_returns_queued_frames_in_order() {
        let queue = FrameQueue::new(4);
        queue.push(make_frame(1));
        queue.push(make_frame(2));

        assert_eq!(queue.next().await.data[0], 1);
        assert_eq!(queue.next().await.data[0], 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear_empties_queue() {
        let queue = FrameQueue::new(4);
        queue.push(make_frame(1));
        queue.clear();
        assert!(queue.try_pop().is_none());
    }
}
