use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::frame::Frame;

/// default number of slots; two is the minimum that lets the interpreter
/// start the next frame while the last one is still on screen
pub const DEFAULT_CAPACITY: usize = 2;

/// default number of frames the channel refuses to evict, so a repaint
/// always has something to draw once the first frame has landed
pub const DEFAULT_RETENTION_FLOOR: usize = 1;

/// how a push can go wrong
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// caller handed us a frame that doesn't fit the plane agreed at open
    #[error("frame is {got_width}x{got_height} but the channel was opened at {want_width}x{want_height}")]
    DimensionMismatch {
        got_width: usize,
        got_height: usize,
        want_width: usize,
        want_height: usize,
    },

    /// the session shut the channel down; the frame was dropped
    #[error("frame channel is closed")]
    Closed,
}

/// Channel geometry and queueing policy, fixed at `open`. Raising `capacity`
/// smooths a bursty producer at the cost of latency; `retention_floor` 0
/// gives a strictly draining queue whose display goes blank between ticks.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    pub width: usize,
    pub height: usize,
    pub capacity: usize,
    pub retention_floor: usize,
}

impl ChannelConfig {
    pub fn new(width: usize, height: usize) -> Self {
        ChannelConfig {
            width,
            height,
            capacity: DEFAULT_CAPACITY,
            retention_floor: DEFAULT_RETENTION_FLOOR,
        }
    }
}

struct Queue {
    frames: VecDeque<Arc<Frame>>,
    closed: bool,
}

/// Bounded, backpressured hand-off between the interpreter thread and the
/// presentation path. `push` transfers a frame in and suspends the producer
/// while all slots are taken; `peek_latest` hands the oldest frame out
/// without ever blocking, and keeps `retention_floor` frames queued so
/// repaints triggered by the host (resize, damage) between ticks still have
/// pixels to draw.
///
/// Exactly one producer and one consumer are assumed. The queue is the only
/// shared mutable state; published frames are immutable, so the handles
/// returned by `peek_latest` are readable without further locking.
pub struct FrameChannel {
    config: ChannelConfig,
    queue: Mutex<Queue>,
    // signalled when a slot genuinely frees, and on close
    free_slot: Condvar,
}

impl FrameChannel {
    /// create the channel for one emulation session
    pub fn open(config: ChannelConfig) -> Arc<FrameChannel> {
        assert!(config.capacity >= 1, "channel needs at least one slot");
        assert!(
            config.retention_floor < config.capacity,
            "retention floor must leave room to queue a replacement"
        );
        Arc::new(FrameChannel {
            config,
            queue: Mutex::new(Queue {
                frames: VecDeque::with_capacity(config.capacity),
                closed: false,
            }),
            free_slot: Condvar::new(),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Transfer `frame` into the channel. Blocks the calling thread while
    /// the channel is full; the wait ends when the consumer frees a slot or
    /// the session closes the channel, in which case the frame is dropped
    /// and `Closed` comes back.
    pub fn push(&self, frame: Frame) -> Result<(), PushError> {
        if frame.width() != self.config.width || frame.height() != self.config.height {
            return Err(PushError::DimensionMismatch {
                got_width: frame.width(),
                got_height: frame.height(),
                want_width: self.config.width,
                want_height: self.config.height,
            });
        }

        let mut queue = self.queue.lock();
        while queue.frames.len() == self.config.capacity && !queue.closed {
            trace!("channel full at {} frames, producer waiting", queue.frames.len());
            self.free_slot.wait(&mut queue);
        }
        if queue.closed {
            return Err(PushError::Closed);
        }

        queue.frames.push_back(Arc::new(frame));
        debug_assert!(
            queue.frames.len() <= self.config.capacity,
            "bounded queue overshot its capacity"
        );
        trace!("frame queued, {} of {} slots taken", queue.frames.len(), self.config.capacity);
        Ok(())
    }

    /// Hand out the oldest queued frame without blocking. Above the
    /// retention floor the frame is removed and the producer is woken; at
    /// the floor the same frame keeps being returned until a replacement is
    /// queued. `None` only before the first push (or whenever a floor-0
    /// channel has drained).
    pub fn peek_latest(&self) -> Option<Arc<Frame>> {
        let mut queue = self.queue.lock();
        if queue.frames.len() > self.config.retention_floor {
            let frame = queue.frames.pop_front();
            // a slot genuinely freed, so let the producer back in. the
            // retained branch below must never signal: waking the producer
            // without having removed anything would let it overshoot the
            // capacity bound
            self.free_slot.notify_one();
            trace!("frame consumed, {} left queued", queue.frames.len());
            frame
        } else {
            queue.frames.front().cloned()
        }
    }

    /// frames currently queued
    pub fn len(&self) -> usize {
        self.queue.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    /// Shut the channel down. Any blocked `push` returns `Closed`; further
    /// pushes are refused; `peek_latest` keeps serving the retained frame so
    /// the display stays static instead of blanking. Closing twice is a
    /// no-op, and closing while a `push` is in flight is safe.
    pub fn close(&self) {
        let mut queue = self.queue.lock();
        if queue.closed {
            return;
        }
        queue.closed = true;
        debug!("frame channel closed with {} frames still queued", queue.frames.len());
        self.free_slot.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn frame_2x2(plane: &[u8; 4]) -> Frame {
        let mut f = Frame::new(2, 2).unwrap();
        f.plane_mut().copy_from_slice(plane);
        f
    }

    fn open_2x2(capacity: usize, retention_floor: usize) -> Arc<FrameChannel> {
        FrameChannel::open(ChannelConfig {
            capacity,
            retention_floor,
            ..ChannelConfig::new(2, 2)
        })
    }

    #[test]
    fn test_peek_before_first_push_is_none() {
        let ch = open_2x2(2, 1);
        assert!(ch.peek_latest().is_none());
        assert_eq!(ch.len(), 0);
    }

    #[test]
    fn test_capacity_invariant_over_mixed_ops() {
        let ch = open_2x2(2, 1);
        ch.push(frame_2x2(&[1, 0, 0, 0])).unwrap();
        assert!(ch.len() <= 2);
        ch.push(frame_2x2(&[0, 1, 0, 0])).unwrap();
        assert!(ch.len() <= 2);
        let _ = ch.peek_latest();
        assert!(ch.len() <= 2);
        ch.push(frame_2x2(&[0, 0, 1, 0])).unwrap();
        assert!(ch.len() <= 2);
        let _ = ch.peek_latest();
        let _ = ch.peek_latest();
        assert!(ch.len() <= 2);
    }

    #[test]
    fn test_retention_once_primed() {
        let ch = open_2x2(2, 1);
        ch.push(frame_2x2(&[1, 2, 3, 4])).unwrap();
        for _ in 0..10 {
            assert!(ch.peek_latest().is_some());
            assert_eq!(ch.len(), 1);
        }
    }

    #[test]
    fn test_last_frame_idempotence() {
        let ch = open_2x2(2, 1);
        ch.push(frame_2x2(&[1, 0, 0, 1])).unwrap();
        for _ in 0..5 {
            let f = ch.peek_latest().expect("primed channel never runs dry");
            assert_eq!(f.plane(), &[1, 0, 0, 1]);
        }
    }

    #[test]
    fn test_order_preserved() {
        let ch = open_2x2(4, 1);
        ch.push(frame_2x2(&[1, 0, 0, 0])).unwrap();
        ch.push(frame_2x2(&[2, 0, 0, 0])).unwrap();
        ch.push(frame_2x2(&[3, 0, 0, 0])).unwrap();
        assert_eq!(ch.peek_latest().unwrap().plane()[0], 1);
        assert_eq!(ch.peek_latest().unwrap().plane()[0], 2);
        assert_eq!(ch.peek_latest().unwrap().plane()[0], 3);
        // the last one is retained, not consumed
        assert_eq!(ch.len(), 1);
        assert_eq!(ch.peek_latest().unwrap().plane()[0], 3);
    }

    #[test]
    fn test_copy_isolation_through_the_channel() {
        let ch = open_2x2(2, 1);
        let mut working = frame_2x2(&[1, 0, 0, 1]);
        ch.push(working.snapshot().unwrap()).unwrap();
        // producer moves on to the next tick's pixels
        working.plane_mut().copy_from_slice(&[7, 7, 7, 7]);
        assert_eq!(ch.peek_latest().unwrap().plane(), &[1, 0, 0, 1]);
    }

    #[test]
    fn test_backpressure_blocks_and_unblocks() {
        let ch = open_2x2(2, 1);
        ch.push(frame_2x2(&[1, 0, 0, 0])).unwrap();
        ch.push(frame_2x2(&[2, 0, 0, 0])).unwrap();

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                ch.push(frame_2x2(&[3, 0, 0, 0])).unwrap();
                done_tx.send(()).unwrap();
            })
        };

        // third push must still be suspended
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        // consuming above the floor frees a slot and lets it through
        assert_eq!(ch.peek_latest().unwrap().plane()[0], 1);
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("push should unblock once a slot frees");
        producer.join().unwrap();
        assert_eq!(ch.len(), 2);
    }

    // the concrete capacity-2 trace: F1 primes the queue and is retained by
    // the first peek; F2 fills the second slot; F3 blocks until a peek
    // removes the oldest queued frame
    #[test]
    fn test_capacity_two_trace() {
        let ch = open_2x2(2, 1);
        ch.push(frame_2x2(&[1, 0, 0, 1])).unwrap();
        assert_eq!(ch.peek_latest().unwrap().plane(), &[1, 0, 0, 1]);
        assert_eq!(ch.len(), 1);

        ch.push(frame_2x2(&[0, 1, 1, 0])).unwrap();
        assert_eq!(ch.len(), 2);

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                ch.push(frame_2x2(&[1, 1, 0, 0])).unwrap();
                done_tx.send(()).unwrap();
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());

        // oldest queued frame is still F1; consuming it admits F3
        assert_eq!(ch.peek_latest().unwrap().plane(), &[1, 0, 0, 1]);
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();

        assert_eq!(ch.peek_latest().unwrap().plane(), &[0, 1, 1, 0]);
        assert_eq!(ch.peek_latest().unwrap().plane(), &[1, 1, 0, 0]);
        assert_eq!(ch.len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected_at_the_boundary() {
        let ch = open_2x2(2, 1);
        let wrong = Frame::new(4, 4).unwrap();
        assert_eq!(
            ch.push(wrong),
            Err(PushError::DimensionMismatch {
                got_width: 4,
                got_height: 4,
                want_width: 2,
                want_height: 2,
            })
        );
        assert_eq!(ch.len(), 0);
    }

    #[test]
    fn test_close_unblocks_waiting_push() {
        let ch = open_2x2(2, 1);
        ch.push(frame_2x2(&[1, 0, 0, 0])).unwrap();
        ch.push(frame_2x2(&[2, 0, 0, 0])).unwrap();

        let producer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.push(frame_2x2(&[3, 0, 0, 0])))
        };
        thread::sleep(Duration::from_millis(50));
        ch.close();
        assert_eq!(producer.join().unwrap(), Err(PushError::Closed));
    }

    #[test]
    fn test_push_after_close_refused() {
        let ch = open_2x2(2, 1);
        ch.close();
        assert_eq!(ch.push(frame_2x2(&[1, 0, 0, 0])), Err(PushError::Closed));
    }

    #[test]
    fn test_peek_after_close_serves_retained_frame() {
        let ch = open_2x2(2, 1);
        ch.push(frame_2x2(&[1, 0, 0, 1])).unwrap();
        ch.close();
        // display stays static rather than failing
        for _ in 0..3 {
            assert_eq!(ch.peek_latest().unwrap().plane(), &[1, 0, 0, 1]);
        }
    }

    #[test]
    fn test_close_is_idempotent() {
        let ch = open_2x2(2, 1);
        ch.close();
        ch.close();
        assert!(ch.is_closed());
    }

    #[test]
    fn test_floorless_queue_drains_dry() {
        let ch = open_2x2(2, 0);
        ch.push(frame_2x2(&[1, 0, 0, 0])).unwrap();
        assert!(ch.peek_latest().is_some());
        // no floor: the display would go blank between ticks
        assert!(ch.peek_latest().is_none());
        assert_eq!(ch.len(), 0);
    }

    #[test]
    fn test_single_slot_lockstep() {
        let ch = open_2x2(1, 0);
        ch.push(frame_2x2(&[1, 0, 0, 0])).unwrap();
        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                ch.push(frame_2x2(&[2, 0, 0, 0])).unwrap();
                done_tx.send(()).unwrap();
            })
        };
        assert!(done_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(ch.peek_latest().unwrap().plane()[0], 1);
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        producer.join().unwrap();
    }

    #[test]
    #[should_panic]
    fn test_zero_capacity_rejected() {
        let _ = open_2x2(0, 0);
    }

    #[test]
    #[should_panic]
    fn test_floor_must_leave_headroom() {
        let _ = open_2x2(2, 2);
    }
}
