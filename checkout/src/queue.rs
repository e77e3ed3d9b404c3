//! Blocking bounded queue for many producers and one consumer.
//!
//! [`BoundedQueue`] is a fixed-capacity FIFO shared by reference between
//! threads. It combines three primitives:
//!
//! - one `Mutex` guarding the [`Ring`] (storage, head, tail, size)
//! - a `slots` [`Permit`] counting free slots, starting at `capacity`
//! - an `items` [`Permit`] counting filled slots, starting at 0
//!
//! # Protocol
//!
//! ```text
//! enqueue:  slots.acquire()  ->  lock { ring.push }  ->  items.release()
//! dequeue:  items.acquire()  ->  lock { ring.pop  }  ->  slots.release()
//! ```
//!
//! A permit is always acquired before the lock and never while holding it.
//! Waiting on a permit with the lock held would park the one thread able to
//! release it.
//!
//! # Example
//!
//! ```
//! use checkout::queue::BoundedQueue;
//!
//! let queue = BoundedQueue::new(2).unwrap();
//!
//! std::thread::scope(|s| {
//!     s.spawn(|| {
//!         for item in 0..5u64 {
//!             queue.enqueue_blocking(item).unwrap();
//!         }
//!     });
//!
//!     let received: Vec<u64> = (0..5)
//!         .map(|_| queue.dequeue_blocking().unwrap().0)
//!         .collect();
//!     assert_eq!(received, vec![0, 1, 2, 3, 4]);
//! });
//! ```

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

pub use crate::ring::Occupancy;
use crate::ring::Ring;
use crate::sync::Timeout;
use crate::sync::permit::{AcquireError, Permit, TryAcquireError};
use crate::trace::{debug, trace};

/// Errors from queue construction and dequeueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// A queue needs at least one slot.
    #[error("queue capacity must be greater than 0")]
    ZeroCapacity,
    /// The queue was closed and holds no more items.
    #[error("queue closed")]
    Closed,
    /// The timeout elapsed before an item arrived.
    #[error("timed out waiting for an item")]
    TimedOut,
}

/// The queue was closed; the rejected item is handed back.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Closed<T>(pub T);

impl<T> Closed<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Closed(..)")
    }
}

impl<T> fmt::Display for Closed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("queue closed")
    }
}

impl<T> std::error::Error for Closed<T> {}

/// Non-blocking enqueue failure; the rejected item is handed back.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TryEnqueueError<T> {
    /// Every slot is occupied.
    Full(T),
    /// The queue was closed.
    Closed(T),
}

impl<T> TryEnqueueError<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(item) | Self::Closed(item) => item,
        }
    }
}

impl<T> fmt::Debug for TryEnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for TryEnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("queue full"),
            Self::Closed(_) => f.write_str("queue closed"),
        }
    }
}

impl<T> std::error::Error for TryEnqueueError<T> {}

/// Bounded enqueue failure; the rejected item is handed back.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError<T> {
    /// The queue was closed.
    Closed(T),
    /// The timeout elapsed before a slot freed up.
    TimedOut(T),
}

impl<T> EnqueueError<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Closed(item) | Self::TimedOut(item) => item,
        }
    }
}

impl<T> fmt::Debug for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::TimedOut(_) => f.write_str("TimedOut(..)"),
        }
    }
}

impl<T> fmt::Display for EnqueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("queue closed"),
            Self::TimedOut(_) => f.write_str("timed out waiting for a free slot"),
        }
    }
}

impl<T> std::error::Error for EnqueueError<T> {}

/// State behind the exclusive-access lock.
struct Guarded<T> {
    ring: Ring<T>,
    closed: bool,
    peak: usize,
}

/// Fixed-capacity FIFO with blocking enqueue and dequeue.
///
/// Share it by reference (scoped threads) or behind an `Arc`. All mutation
/// goes through the methods below; none of them hold the lock across a wait.
pub struct BoundedQueue<T> {
    guarded: Mutex<Guarded<T>>,
    /// Free slots.
    slots: Permit,
    /// Filled slots.
    items: Permit,
    capacity: NonZeroUsize,
}

impl<T> BoundedQueue<T> {
    /// Creates an empty queue with `capacity` slots.
    ///
    /// # Errors
    ///
    /// [`QueueError::ZeroCapacity`] if `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(QueueError::ZeroCapacity)?;
        debug!(capacity = capacity.get(), "bounded queue created");
        Ok(Self {
            guarded: Mutex::new(Guarded {
                ring: Ring::with_capacity(capacity),
                closed: false,
                peak: 0,
            }),
            slots: Permit::new(capacity.get()),
            items: Permit::new(0),
            capacity,
        })
    }

    /// Ring updates finish before anything inside the critical section can
    /// panic, so a poisoned guard still holds a consistent ring.
    fn lock(&self) -> MutexGuard<'_, Guarded<T>> {
        self.guarded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `item` once a slot permit has been taken.
    fn push_with_slot(&self, item: T) -> Result<Occupancy, T> {
        let mut guarded = self.lock();
        if guarded.closed {
            drop(guarded);
            self.slots.release();
            return Err(item);
        }
        let pushed = guarded.ring.push(item);
        if let Ok(occupancy) = &pushed {
            guarded.peak = guarded.peak.max(occupancy.size);
        }
        drop(guarded);

        match pushed {
            Ok(occupancy) => {
                trace!(
                    size = occupancy.size,
                    head = occupancy.head,
                    tail = occupancy.tail,
                    "enqueued"
                );
                self.items.release();
                Ok(occupancy)
            }
            // A held slot permit guarantees room; only a closed queue gets here.
            Err(item) => {
                self.slots.release();
                Err(item)
            }
        }
    }

    /// Takes the head item once an item permit was taken, or the queue closed.
    fn pop_with_item(&self) -> Result<(T, Occupancy), QueueError> {
        let mut guarded = self.lock();
        let popped = guarded.ring.pop();
        drop(guarded);

        let (item, occupancy) = popped.ok_or(QueueError::Closed)?;
        trace!(
            size = occupancy.size,
            head = occupancy.head,
            tail = occupancy.tail,
            "dequeued"
        );
        self.slots.release();
        Ok((item, occupancy))
    }

    /// Enqueues `item` if a slot is free right now.
    ///
    /// # Errors
    ///
    /// [`TryEnqueueError::Full`] when every slot is taken,
    /// [`TryEnqueueError::Closed`] after [`close`](Self::close).
    pub fn try_enqueue(&self, item: T) -> Result<Occupancy, TryEnqueueError<T>> {
        match self.slots.try_acquire() {
            Ok(()) => self.push_with_slot(item).map_err(TryEnqueueError::Closed),
            Err(TryAcquireError::Empty) => {
                if self.is_closed() {
                    Err(TryEnqueueError::Closed(item))
                } else {
                    Err(TryEnqueueError::Full(item))
                }
            }
            Err(TryAcquireError::Closed) => Err(TryEnqueueError::Closed(item)),
        }
    }

    /// Dequeues the head item if one is available right now.
    pub fn try_dequeue(&self) -> Option<(T, Occupancy)> {
        match self.items.try_acquire() {
            Ok(()) | Err(TryAcquireError::Closed) => self.pop_with_item().ok(),
            Err(TryAcquireError::Empty) => None,
        }
    }

    /// Waits up to `timeout` for a free slot, then enqueues `item`.
    ///
    /// # Errors
    ///
    /// [`EnqueueError::Closed`] once the queue is closed,
    /// [`EnqueueError::TimedOut`] if no slot freed up in time.
    pub fn enqueue_timeout(
        &self,
        item: T,
        timeout: Timeout,
    ) -> Result<Occupancy, EnqueueError<T>> {
        match self.slots.acquire(timeout) {
            Ok(()) => self.push_with_slot(item).map_err(EnqueueError::Closed),
            Err(AcquireError::Closed) => Err(EnqueueError::Closed(item)),
            Err(AcquireError::TimedOut) => Err(EnqueueError::TimedOut(item)),
        }
    }

    /// Blocks until a slot is free, then enqueues `item`.
    ///
    /// # Errors
    ///
    /// Returns the item in [`Closed`] if the queue is closed before or while
    /// waiting.
    pub fn enqueue_blocking(&self, item: T) -> Result<Occupancy, Closed<T>> {
        self.enqueue_timeout(item, Timeout::Infinite)
            .map_err(|e| Closed(e.into_inner()))
    }

    /// Waits up to `timeout` for an item, then dequeues it.
    ///
    /// A closed queue keeps handing out the items it still holds.
    ///
    /// # Errors
    ///
    /// [`QueueError::Closed`] once the queue is closed and drained,
    /// [`QueueError::TimedOut`] if nothing arrived in time.
    pub fn dequeue_timeout(&self, timeout: Timeout) -> Result<(T, Occupancy), QueueError> {
        match self.items.acquire(timeout) {
            Ok(()) | Err(AcquireError::Closed) => self.pop_with_item(),
            Err(AcquireError::TimedOut) => Err(QueueError::TimedOut),
        }
    }

    /// Blocks until an item is available, then dequeues it.
    ///
    /// # Errors
    ///
    /// [`QueueError::Closed`] once the queue is closed and drained.
    pub fn dequeue_blocking(&self) -> Result<(T, Occupancy), QueueError> {
        self.dequeue_timeout(Timeout::Infinite)
    }

    /// Closes the queue and wakes every blocked producer and consumer.
    ///
    /// Later enqueues fail; dequeues drain the remaining items and then
    /// fail with [`QueueError::Closed`]. Idempotent.
    pub fn close(&self) {
        let mut guarded = self.lock();
        let already = std::mem::replace(&mut guarded.closed, true);
        let remaining = guarded.ring.len();
        drop(guarded);

        if !already {
            debug!(remaining, "bounded queue closed");
        }
        self.slots.close();
        self.items.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity.get()
    }

    /// Items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }

    /// Largest size the queue reached so far.
    #[must_use]
    pub fn peak_len(&self) -> usize {
        self.lock().peak
    }
}

impl<T> fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guarded = self.lock();
        f.debug_struct("BoundedQueue")
            .field("ring", &guarded.ring)
            .field("closed", &guarded.closed)
            .field("free_slots", &self.slots.available())
            .field("ready_items", &self.items.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(
            BoundedQueue::<u64>::new(0).unwrap_err(),
            QueueError::ZeroCapacity
        );
    }

    #[test]
    fn try_enqueue_full() {
        let queue = BoundedQueue::new(4).unwrap();

        for i in 0..4u64 {
            assert!(queue.try_enqueue(i).is_ok(), "Failed to push item {i}");
        }
        assert!(queue.is_full());
        assert_eq!(queue.try_enqueue(999), Err(TryEnqueueError::Full(999)));

        assert_eq!(queue.try_dequeue().map(|(item, _)| item), Some(0));
        assert!(queue.try_enqueue(4).is_ok());
        assert_eq!(queue.try_enqueue(1000), Err(TryEnqueueError::Full(1000)));
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn try_dequeue_empty() {
        let queue = BoundedQueue::<u64>::new(2).unwrap();

        assert!(queue.try_dequeue().is_none());
        queue.try_enqueue(42).unwrap();
        assert_eq!(queue.try_dequeue().map(|(item, _)| item), Some(42));
        assert!(queue.try_dequeue().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn occupancy_reports_indices() {
        let queue = BoundedQueue::new(4).unwrap();

        let occ = queue.enqueue_blocking(100u64).unwrap();
        assert_eq!(occ, Occupancy { size: 1, head: 0, tail: 1, ticket: 0 });
        let occ = queue.enqueue_blocking(101).unwrap();
        assert_eq!(occ, Occupancy { size: 2, head: 0, tail: 2, ticket: 1 });

        let (item, occ) = queue.dequeue_blocking().unwrap();
        assert_eq!(item, 100);
        assert_eq!(occ, Occupancy { size: 1, head: 1, tail: 2, ticket: 0 });
    }

    #[test]
    fn enqueue_blocks_until_dequeue() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.enqueue_blocking(1u64).unwrap();

        thread::scope(|s| {
            let producer = s.spawn(|| queue.enqueue_blocking(2));

            thread::sleep(Duration::from_millis(20));
            assert_eq!(queue.len(), 1);
            assert_eq!(queue.dequeue_blocking().unwrap().0, 1);

            assert!(producer.join().unwrap().is_ok());
        });
        assert_eq!(queue.dequeue_blocking().unwrap().0, 2);
    }

    #[test]
    fn dequeue_blocks_until_enqueue() {
        let queue = BoundedQueue::new(2).unwrap();

        thread::scope(|s| {
            let consumer = s.spawn(|| queue.dequeue_blocking().map(|(item, _)| item));

            thread::sleep(Duration::from_millis(20));
            queue.enqueue_blocking(7u64).unwrap();

            assert_eq!(consumer.join().unwrap(), Ok(7));
        });
    }

    #[test]
    fn timeouts_leave_queue_untouched() {
        let queue = BoundedQueue::new(1).unwrap();

        assert_eq!(
            queue.dequeue_timeout(Duration::from_millis(10).into()),
            Err(QueueError::TimedOut)
        );

        queue.enqueue_blocking(1u64).unwrap();
        let err = queue
            .enqueue_timeout(2, Duration::from_millis(10).into())
            .unwrap_err();
        assert_eq!(err, EnqueueError::TimedOut(2));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.dequeue_blocking().unwrap().0, 1);
    }

    #[test]
    fn unbounded_timeouts_wait_instead_of_panicking() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.enqueue_blocking(1u64).unwrap();

        thread::scope(|s| {
            let producer = s.spawn(|| queue.enqueue_timeout(2, Duration::MAX.into()));
            thread::sleep(Duration::from_millis(20));
            assert_eq!(queue.dequeue_timeout(Duration::MAX.into()).unwrap().0, 1);

            assert!(producer.join().unwrap().is_ok());
        });
        assert_eq!(queue.dequeue_timeout(Duration::MAX.into()).unwrap().0, 2);
    }

    #[test]
    fn close_wakes_blocked_producer() {
        let queue = BoundedQueue::new(1).unwrap();
        queue.enqueue_blocking(1u64).unwrap();

        thread::scope(|s| {
            let producer = s.spawn(|| queue.enqueue_blocking(2));
            thread::sleep(Duration::from_millis(20));
            queue.close();

            assert_eq!(producer.join().unwrap().unwrap_err().into_inner(), 2);
        });
        assert_eq!(queue.try_enqueue(3), Err(TryEnqueueError::Closed(3)));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let queue = BoundedQueue::<u64>::new(2).unwrap();

        thread::scope(|s| {
            let consumer = s.spawn(|| queue.dequeue_blocking().map(|(item, _)| item));
            thread::sleep(Duration::from_millis(20));
            queue.close();

            assert_eq!(consumer.join().unwrap(), Err(QueueError::Closed));
        });
    }

    #[test]
    fn closed_queue_drains_remaining_items() {
        let queue = BoundedQueue::new(4).unwrap();
        queue.enqueue_blocking(1u64).unwrap();
        queue.enqueue_blocking(2).unwrap();
        queue.close();
        queue.close();

        assert!(queue.enqueue_blocking(3).is_err());
        assert_eq!(queue.dequeue_blocking().map(|(item, _)| item), Ok(1));
        assert_eq!(queue.try_dequeue().map(|(item, _)| item), Some(2));
        assert_eq!(queue.dequeue_blocking().unwrap_err(), QueueError::Closed);
        assert!(queue.try_dequeue().is_none());
    }

    #[test]
    fn concurrent_producers_single_consumer() {
        let queue = BoundedQueue::new(3).unwrap();
        let producers = 4u64;
        let per_producer = 50u64;

        let mut received = thread::scope(|s| {
            for p in 1..=producers {
                let queue = &queue;
                s.spawn(move || {
                    for i in 0..per_producer {
                        queue.enqueue_blocking(p * 1000 + i).unwrap();
                    }
                });
            }

            let mut received = Vec::new();
            for _ in 0..producers * per_producer {
                let (item, occ) = queue.dequeue_blocking().unwrap();
                assert!(occ.size < queue.capacity());
                received.push(item);
            }
            received
        });

        // Each producer's own items arrive in order.
        for p in 1..=producers {
            let own: Vec<u64> = received
                .iter()
                .copied()
                .filter(|item| item / 1000 == p)
                .collect();
            assert_eq!(own, (0..per_producer).map(|i| p * 1000 + i).collect::<Vec<_>>());
        }

        received.sort_unstable();
        let mut expected: Vec<u64> = (1..=producers)
            .flat_map(|p| (0..per_producer).map(move |i| p * 1000 + i))
            .collect();
        expected.sort_unstable();
        assert_eq!(received, expected);
        assert!(queue.peak_len() <= queue.capacity());
        assert!(queue.is_empty());
    }

    #[test]
    fn non_copy_type() {
        let queue = BoundedQueue::new(2).unwrap();

        queue.enqueue_blocking("hello".to_string()).unwrap();
        queue.enqueue_blocking("world".to_string()).unwrap();
        assert_eq!(queue.dequeue_blocking().unwrap().0, "hello");
        assert_eq!(queue.dequeue_blocking().unwrap().0, "world");
    }
}
