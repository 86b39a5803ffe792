//! C2 — fixed-capacity ring buffer with multiple producers, a single
//! consumer, and non-blocking backpressure (`spec.md` §4.2).
//!
//! Grounded on the same mutex+condvar bounded-queue shape the pack's
//! `audio-bridge` crate uses for its decode→playback ring (`queue.rs`), but
//! producers here never block: a full queue makes `try_push` return `false`
//! and the caller applies its own drop policy (video drops the newest frame,
//! audio drops the oldest packet), per I2.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Normative capacity for the video frame queue (`spec.md` §4.2).
pub const VIDEO_QUEUE_CAPACITY: usize = 5;
/// Normative capacity for the audio packet queue (`spec.md` §4.2).
pub const AUDIO_QUEUE_CAPACITY: usize = 16;

struct Inner<T> {
    items: VecDeque<T>,
}

/// A fixed-capacity MPSC ring buffer.
///
/// `size() <= capacity()` holds under arbitrary producer concurrency; `T` is
/// moved through the queue, never copied or cloned by the queue itself.
pub struct BoundedQueue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    cv: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "BoundedQueue capacity must be non-zero");
        Self {
            capacity,
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
            }),
            cv: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate current occupancy. Never exceeds `capacity()`.
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    pub fn full(&self) -> bool {
        self.size() >= self.capacity
    }

    /// Non-blocking push. Returns `false` (and hands the item back) if the
    /// queue is full — the caller must apply its own drop policy.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let mut guard = self.inner.lock().unwrap();
        if guard.items.len() >= self.capacity {
            return Err(item);
        }
        guard.items.push_back(item);
        drop(guard);
        self.cv.notify_one();
        Ok(())
    }

    /// Non-blocking pop. Side-effect-free on an empty queue.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().unwrap().items.pop_front()
    }

    /// Bounded wait for an item. Polls cooperatively; never blocks longer
    /// than `timeout`.
    pub fn wait_pop(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(item) = guard.items.pop_front() {
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (g, _timeout_result) = self.cv.wait_timeout(guard, deadline - now).unwrap();
            guard = g;
        }
    }

    /// Push under the audio queue's drop-oldest policy: if full, evict the
    /// oldest buffered item to make room, returning it to the caller so it
    /// can advance a dropped-packet counter.
    pub fn push_drop_oldest(&self, item: T) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        let evicted = if guard.items.len() >= self.capacity {
            guard.items.pop_front()
        } else {
            None
        };
        guard.items.push_back(item);
        drop(guard);
        self.cv.notify_one();
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn try_push_respects_capacity() {
        let q: BoundedQueue<u32> = BoundedQueue::new(2);
        assert!(q.try_push(1).is_ok());
        assert!(q.try_push(2).is_ok());
        assert_eq!(q.try_push(3), Err(3));
        assert_eq!(q.size(), 2);
        assert!(q.full());
    }

    #[test]
    fn try_pop_empty_is_side_effect_free() {
        let q: BoundedQueue<u32> = BoundedQueue::new(4);
        assert_eq!(q.try_pop(), None);
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn fifo_order_preserved() {
        let q: BoundedQueue<u32> = BoundedQueue::new(4);
        q.try_push(1).unwrap();
        q.try_push(2).unwrap();
        assert_eq!(q.try_pop(), Some(1));
        assert_eq!(q.try_pop(), Some(2));
    }

    #[test]
    fn wait_pop_times_out_on_empty_queue() {
        let q: BoundedQueue<u32> = BoundedQueue::new(4);
        let start = Instant::now();
        let result = q.wait_pop(Duration::from_millis(20));
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_pop_wakes_on_push() {
        let q = Arc::new(BoundedQueue::<u32>::new(4));
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            q2.try_push(7).unwrap();
        });
        let result = q.wait_pop(Duration::from_secs(1));
        assert_eq!(result, Some(7));
        handle.join().unwrap();
    }

    #[test]
    fn size_never_exceeds_capacity_under_concurrency() {
        let q = Arc::new(BoundedQueue::<u32>::new(VIDEO_QUEUE_CAPACITY));
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let q = q.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..50 {
                    let _ = q.try_push(i);
                    assert!(q.size() <= VIDEO_QUEUE_CAPACITY);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert!(q.size() <= VIDEO_QUEUE_CAPACITY);
    }

    #[test]
    fn push_drop_oldest_evicts_the_front_item() {
        let q: BoundedQueue<u32> = BoundedQueue::new(2);
        assert_eq!(q.push_drop_oldest(1), None);
        assert_eq!(q.push_drop_oldest(2), None);
        assert_eq!(q.push_drop_oldest(3), Some(1));
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.try_pop(), Some(3));
    }

    #[test]
    fn capacities_match_normative_values() {
        assert_eq!(VIDEO_QUEUE_CAPACITY, 5);
        assert_eq!(AUDIO_QUEUE_CAPACITY, 16);
    }
}
