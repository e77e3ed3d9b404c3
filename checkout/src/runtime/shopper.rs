//! Shopper task: the producer side of a run.
//!
//! A shopper emits a fixed, deterministic sequence of item ids and places
//! them on the belt one at a time, waiting whenever the belt is full.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::{Actor, EventKind, Item, Observer, QueueEvent};
use crate::queue::BoundedQueue;
use crate::trace::debug;

use super::TaskError;

/// Spacing between the item ids of consecutive shoppers.
pub const ITEM_STRIDE: u64 = 100;

/// Most items one shopper may place before its ids run into the next
/// shopper's range.
pub const MAX_ITEMS: usize = ITEM_STRIDE as usize;

/// Producer task descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shopper {
    /// 1-based shopper id.
    pub id: u32,
    /// Items this shopper places on the belt.
    pub item_count: usize,
    /// Pause after each item.
    pub pacing: Option<Duration>,
}

/// What a shopper placed on the belt, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopperReport {
    pub id: u32,
    pub items: Vec<Item>,
}

impl Shopper {
    #[must_use]
    pub const fn new(id: u32, item_count: usize) -> Self {
        Self {
            id,
            item_count,
            pacing: None,
        }
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing;
        self
    }

    /// Id of this shopper's `seq`-th item: `id * 100 + seq`.
    #[must_use]
    pub fn item_id(&self, seq: usize) -> Item {
        u64::from(self.id) * ITEM_STRIDE + seq as u64
    }

    /// Every item id this shopper emits, in emission order.
    pub fn items(&self) -> impl Iterator<Item = Item> + '_ {
        (0..self.item_count).map(|seq| self.item_id(seq))
    }

    /// Enqueues every item, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// [`TaskError::QueueClosed`] if the queue closes before all items are
    /// placed; `completed` counts the items that made it.
    pub fn run(
        &self,
        queue: &BoundedQueue<Item>,
        observer: &dyn Observer,
    ) -> Result<ShopperReport, TaskError> {
        let actor = Actor::Shopper(self.id);
        let mut placed = Vec::with_capacity(self.item_count);

        for item in self.items() {
            let occupancy = queue
                .enqueue_blocking(item)
                .map_err(|_| TaskError::QueueClosed {
                    actor,
                    completed: placed.len(),
                })?;
            observer.on_event(&QueueEvent::new(actor, EventKind::Enqueued, item, occupancy));
            placed.push(item);

            if let Some(pause) = self.pacing {
                thread::sleep(pause);
            }
        }

        debug!(shopper = self.id, items = placed.len(), "shopper finished adding items");
        Ok(ShopperReport {
            id: self.id,
            items: placed,
        })
    }
}
