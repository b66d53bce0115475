//! Bounded, lossy frame channels between the reader and its consumers.
//!
//! The producer never blocks: a push onto a full channel drops that frame for
//! that channel only. Consumers poll with a short timeout so they keep
//! observing `stop`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::frame::Frame;

/// Reference channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Outcome of a timed pop.
#[derive(Debug)]
pub enum Pop {
    Frame(Frame),
    Empty,
    Closed,
}

/// Bounded FIFO of frames. Cloning shares the same underlying queue.
#[derive(Clone)]
pub struct FrameChannel {
    name: &'static str,
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    dropped: Arc<AtomicU64>,
}

impl FrameChannel {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            name,
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Non-blocking push. Returns false if the frame was dropped.
    pub fn push(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Wait at most `timeout` for the next frame.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Pop::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Pop::Empty,
            Err(RecvTimeoutError::Disconnected) => Pop::Closed,
        }
    }

    /// Discard everything queued. Returns the number of frames discarded.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0u8; 3], 1, 1, seq, Arc::from("stub://test")).unwrap()
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let channel = FrameChannel::new("detection", DEFAULT_CHANNEL_CAPACITY);
        for seq in 1..=10 {
            assert!(channel.push(frame(seq)));
        }
        let started = Instant::now();
        assert!(!channel.push(frame(11)));
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(channel.dropped(), 1);
        assert_eq!(channel.len(), 10);
    }

    #[test]
    fn delivers_in_push_order() {
        let channel = FrameChannel::new("recording", 4);
        for seq in 1..=3 {
            channel.push(frame(seq));
        }
        let mut seen = Vec::new();
        while let Pop::Frame(f) = channel.pop_timeout(Duration::from_millis(1)) {
            seen.push(f.sequence);
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn drain_empties_queue() {
        let channel = FrameChannel::new("recording", 4);
        channel.push(frame(1));
        channel.push(frame(2));
        assert_eq!(channel.drain(), 2);
        assert!(channel.is_empty());
        assert!(matches!(
            channel.pop_timeout(Duration::from_millis(1)),
            Pop::Empty
        ));
    }
}
