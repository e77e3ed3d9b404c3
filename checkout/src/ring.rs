//! Fixed-capacity circular buffer.
//!
//! [`Ring`] is the plain data structure behind [`crate::queue::BoundedQueue`].
//! It does no synchronization of its own: every method takes `&mut self`, so
//! sharing one across threads requires an external lock.
//!
//! # Layout
//!
//! ```text
//!   head                tail
//!    v                   v
//! [ a ][ b ][ c ][ d ][   ][   ]
//! ```
//!
//! - `head` is the next slot to read, `tail` the next slot to write.
//! - Both advance modulo `capacity`.
//! - `size == capacity` is the full state, where `head == tail` again.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Buffer state observed right after a successful push or pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    /// Items held after the operation.
    pub size: usize,
    /// Next slot to read.
    pub head: usize,
    /// Next slot to write.
    pub tail: usize,
    /// Position of this operation in the ring's push (or pop) order.
    ///
    /// Pop ticket `k` always returns the item stored by push ticket `k`.
    pub ticket: u64,
}

/// Bounded FIFO over a fixed slice of slots.
pub struct Ring<T> {
    storage: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    size: usize,
    pushed: u64,
    popped: u64,
}

impl<T> Ring<T> {
    /// Creates an empty ring with `capacity` slots.
    #[must_use]
    pub fn with_capacity(capacity: NonZeroUsize) -> Self {
        let storage = std::iter::repeat_with(|| None)
            .take(capacity.get())
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            storage,
            head: 0,
            tail: 0,
            size: 0,
            pushed: 0,
            popped: 0,
        }
    }

    /// Advances a cursor to the next slot index, wrapping to 0 at capacity.
    #[inline]
    const fn bump_cursor(cursor: usize, capacity: usize) -> usize {
        let next = cursor + 1;
        if next == capacity { 0 } else { next }
    }

    /// Writes `item` at `tail`.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the ring is full.
    pub fn push(&mut self, item: T) -> Result<Occupancy, T> {
        if self.is_full() {
            return Err(item);
        }

        let slot = &mut self.storage[self.tail];
        debug_assert!(slot.is_none(), "overwriting an unconsumed slot");
        *slot = Some(item);

        self.tail = Self::bump_cursor(self.tail, self.storage.len());
        self.size += 1;
        let ticket = self.pushed;
        self.pushed += 1;

        Ok(self.snapshot(ticket))
    }

    /// Takes the item at `head`, or `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<(T, Occupancy)> {
        if self.is_empty() {
            return None;
        }

        let item = self.storage[self.head].take()?;

        self.head = Self::bump_cursor(self.head, self.storage.len());
        self.size -= 1;
        let ticket = self.popped;
        self.popped += 1;

        Some((item, self.snapshot(ticket)))
    }

    fn snapshot(&self, ticket: u64) -> Occupancy {
        debug_assert_eq!(
            self.size % self.storage.len(),
            (self.tail + self.storage.len() - self.head) % self.storage.len()
        );
        Occupancy {
            size: self.size,
            head: self.head,
            tail: self.tail,
            ticket,
        }
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size == self.storage.len()
    }

    #[inline]
    #[must_use]
    pub const fn head(&self) -> usize {
        self.head
    }

    #[inline]
    #[must_use]
    pub const fn tail(&self) -> usize {
        self.tail
    }
}

impl<T> std::fmt::Debug for Ring<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("capacity", &self.storage.len())
            .field("size", &self.size)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish_non_exhaustive()
    }
}
