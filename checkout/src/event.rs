//! Structured queue events and the observers that consume them.
//!
//! Every successful enqueue by a shopper and dequeue by the cashier produces
//! one [`QueueEvent`]. Events are delivered to an [`Observer`] after the
//! queue lock has been released, so callback order across threads is not the
//! buffer order; the event's `ticket` is.

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::Occupancy;
use crate::trace::info;

/// Item token carried through the queue.
pub type Item = u64;

/// Who performed a queue operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    /// Producer, identified by its 1-based shopper id.
    Shopper(u32),
    /// The single consumer.
    Cashier,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shopper(id) => write!(f, "shopper-{id}"),
            Self::Cashier => f.write_str("cashier"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Enqueued,
    Dequeued,
}

/// One successful queue operation and the buffer state right after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEvent {
    pub actor: Actor,
    pub kind: EventKind,
    pub item: Item,
    pub size: usize,
    pub head: usize,
    pub tail: usize,
    /// Enqueue (or dequeue) order within the buffer.
    pub ticket: u64,
}

impl QueueEvent {
    #[must_use]
    pub const fn new(actor: Actor, kind: EventKind, item: Item, occupancy: Occupancy) -> Self {
        Self {
            actor,
            kind,
            item,
            size: occupancy.size,
            head: occupancy.head,
            tail: occupancy.tail,
            ticket: occupancy.ticket,
        }
    }
}

/// Sink for queue events.
///
/// Shared by reference between every task thread of a run.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &QueueEvent);
}

impl<F> Observer for F
where
    F: Fn(&QueueEvent) + Send + Sync,
{
    fn on_event(&self, event: &QueueEvent) {
        self(event);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn on_event(&self, _event: &QueueEvent) {}
}

/// Emits each event as a structured `tracing` record at `info`.
///
/// Output appears only with the `tracing` feature and an installed
/// subscriber (see [`crate::init_tracing`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn on_event(&self, event: &QueueEvent) {
        info!(
            actor = %event.actor,
            kind = ?event.kind,
            item = event.item,
            size = event.size,
            head = event.head,
            tail = event.tail,
            ticket = event.ticket,
            "queue event"
        );
    }
}

/// Errors while persisting or loading a journal.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal encoding error: {0}")]
    Encode(#[from] postcard::Error),
    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// In-memory audit log of every event seen, in arrival order.
#[derive(Debug, Default)]
pub struct Journal {
    events: Mutex<Vec<QueueEvent>>,
}

impl Journal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<QueueEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items of one kind, ordered by ticket (buffer order).
    #[must_use]
    pub fn in_buffer_order(&self, kind: EventKind) -> Vec<Item> {
        let mut events: Vec<QueueEvent> = self
            .events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect();
        events.sort_unstable_by_key(|event| event.ticket);
        events.into_iter().map(|event| event.item).collect()
    }

    /// Encodes the recorded events with postcard.
    ///
    /// # Errors
    ///
    /// [`JournalError::Encode`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, JournalError> {
        Ok(postcard::to_stdvec(&self.events())?)
    }

    /// Decodes events produced by [`encode`](Self::encode).
    ///
    /// # Errors
    ///
    /// [`JournalError::Encode`] on malformed input.
    pub fn decode(bytes: &[u8]) -> Result<Vec<QueueEvent>, JournalError> {
        Ok(postcard::from_bytes(bytes)?)
    }

    /// Writes the encoded journal to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Encoding or I/O failure.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<(), JournalError> {
        fs::write(path, self.encode()?)?;
        Ok(())
    }
}

impl Observer for Journal {
    fn on_event(&self, event: &QueueEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(*event);
    }
}
