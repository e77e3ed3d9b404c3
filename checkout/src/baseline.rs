//! Unsynchronized checkout, kept for contrast with [`crate::runtime`].
//!
//! [`UnsyncQueue`] stores its indices in atomics but updates them with
//! separate loads and stores and no lock:
//!
//! ```text
//! shopper A: load count=1          store slot[rear]   store count=2
//! shopper B:    load count=1    store slot[rear]         store count=2
//! ```
//!
//! Both shoppers write the same slot and the count moves by one instead of
//! two: one item is lost. The cashier polls with sleeps instead of blocking,
//! and shoppers drop items when the belt is full instead of waiting.
//!
//! Every individual access is atomic, so the races above are logic races,
//! not undefined behaviour. Nothing here is part of the queue contract.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::Item;
use crate::queue::QueueError;
use crate::runtime::{RunError, SimulationConfig};
use crate::trace::{debug, trace, warn};

/// Consecutive empty polls, after every shopper finished, before the
/// cashier gives up on items that will never arrive.
const IDLE_POLL_LIMIT: usize = 8;

/// Circular buffer with check-then-act updates and no mutual exclusion.
#[derive(Debug)]
pub struct UnsyncQueue {
    storage: Box<[AtomicU64]>,
    front: AtomicUsize,
    rear: AtomicUsize,
    count: AtomicUsize,
}

impl UnsyncQueue {
    /// # Errors
    ///
    /// [`QueueError::ZeroCapacity`] if `capacity == 0`.
    pub fn new(capacity: usize) -> Result<Self, QueueError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(QueueError::ZeroCapacity)?;
        Ok(Self {
            storage: (0..capacity.get()).map(|_| AtomicU64::new(0)).collect(),
            front: AtomicUsize::new(0),
            rear: AtomicUsize::new(0),
            count: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Count as last stored; may disagree with what the slots hold.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds `item` if the count looks below capacity; never waits.
    ///
    /// Returns `false` when the belt looked full and the item was dropped.
    pub fn try_add(&self, item: Item) -> bool {
        let count = self.count.load(Ordering::Relaxed);
        if count >= self.capacity() {
            return false;
        }
        let rear = self.rear.load(Ordering::Relaxed);
        self.storage[rear].store(item, Ordering::Relaxed);
        self.rear.store((rear + 1) % self.capacity(), Ordering::Relaxed);
        self.count.store(count + 1, Ordering::Relaxed);
        true
    }

    /// Takes the item at `front` if the count looks positive; never waits.
    pub fn try_take(&self) -> Option<Item> {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return None;
        }
        let front = self.front.load(Ordering::Relaxed);
        let item = self.storage[front].load(Ordering::Relaxed);
        self.front.store((front + 1) % self.capacity(), Ordering::Relaxed);
        self.count.store(count - 1, Ordering::Relaxed);
        Some(item)
    }
}

/// What the unsynchronized run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineReport {
    /// Items a shopper believed it placed.
    pub accepted: Vec<Item>,
    /// Items dropped because the belt looked full.
    pub rejected: Vec<Item>,
    /// Items the cashier took, in order.
    pub consumed: Vec<Item>,
    /// Polls that found the belt empty.
    pub empty_polls: usize,
}

impl BaselineReport {
    /// Accepted items the cashier never saw, counted with multiplicity.
    #[must_use]
    pub fn lost(&self) -> Vec<Item> {
        multiset_difference(&self.accepted, &self.consumed)
    }

    /// Consumed items beyond what was accepted, counted with multiplicity.
    #[must_use]
    pub fn duplicated(&self) -> Vec<Item> {
        multiset_difference(&self.consumed, &self.accepted)
    }

    /// No drops, losses or duplicates.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty() && self.lost().is_empty() && self.duplicated().is_empty()
    }
}

fn multiset_difference(left: &[Item], right: &[Item]) -> Vec<Item> {
    let mut remaining: HashMap<Item, usize> = HashMap::new();
    for item in right {
        *remaining.entry(*item).or_default() += 1;
    }
    let mut diff: Vec<Item> = left
        .iter()
        .filter(|item| match remaining.get_mut(*item) {
            Some(n) if *n > 0 => {
                *n -= 1;
                false
            }
            _ => true,
        })
        .copied()
        .collect();
    diff.sort_unstable();
    diff
}

/// Runs the unsynchronized variant with the same shoppers as `config`.
///
/// Shoppers drop items on a full belt; the cashier sleeps `poll` between
/// empty checks and stops once it has the expected total or the belt stays
/// empty after every shopper finished.
///
/// # Errors
///
/// Configuration errors, or a panicked task.
pub fn run_baseline(config: &SimulationConfig, poll: Duration) -> Result<BaselineReport, RunError> {
    config.validate()?;
    let queue = UnsyncQueue::new(config.capacity)?;
    let shoppers = config.shopper_tasks();
    let expected = config.expected_total();
    let shoppers_done = AtomicBool::new(false);

    debug!(capacity = config.capacity, expected, "baseline run starting");

    thread::scope(|scope| {
        let queue = &queue;
        let shoppers_done = &shoppers_done;

        let cashier = scope.spawn(move || {
            let mut consumed = Vec::with_capacity(expected);
            let mut empty_polls = 0;
            let mut idle = 0;
            while consumed.len() < expected && idle < IDLE_POLL_LIMIT {
                if let Some(item) = queue.try_take() {
                    trace!(item, size = queue.len(), "cashier took item");
                    consumed.push(item);
                    idle = 0;
                } else {
                    empty_polls += 1;
                    if shoppers_done.load(Ordering::Acquire) {
                        idle += 1;
                    }
                    thread::sleep(poll);
                }
            }
            (consumed, empty_polls)
        });

        let handles: Vec<_> = shoppers
            .iter()
            .map(|shopper| {
                scope.spawn(move || {
                    let mut accepted = Vec::new();
                    let mut rejected = Vec::new();
                    for item in shopper.items() {
                        if queue.try_add(item) {
                            accepted.push(item);
                        } else {
                            warn!(shopper = shopper.id, item, "belt full, item dropped");
                            rejected.push(item);
                        }
                        if let Some(pause) = shopper.pacing {
                            thread::sleep(pause);
                        }
                    }
                    (accepted, rejected)
                })
            })
            .collect();

        let mut report = BaselineReport::default();
        let mut failure = None;
        for (shopper, handle) in shoppers.iter().zip(handles) {
            match handle.join() {
                Ok((accepted, rejected)) => {
                    report.accepted.extend(accepted);
                    report.rejected.extend(rejected);
                }
                Err(_) => {
                    failure.get_or_insert(RunError::TaskPanicked {
                        task: format!("shopper-{}", shopper.id),
                        message: "baseline shopper panicked".to_string(),
                    });
                }
            }
        }
        shoppers_done.store(true, Ordering::Release);

        match cashier.join() {
            Ok((consumed, empty_polls)) => {
                report.consumed = consumed;
                report.empty_polls = empty_polls;
            }
            Err(_) => {
                failure.get_or_insert(RunError::TaskPanicked {
                    task: "cashier".to_string(),
                    message: "baseline cashier panicked".to_string(),
                });
            }
        }

        match failure {
            Some(err) => Err(err),
            None => {
                debug!(
                    lost = report.lost().len(),
                    duplicated = report.duplicated().len(),
                    rejected = report.rejected.len(),
                    "baseline run complete"
                );
                Ok(report)
            }
        }
    })
}
