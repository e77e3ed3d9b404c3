//! Cashier task: the single consumer of a run.
//!
//! The cashier knows upfront how many items all shoppers will place and
//! stops exactly when it has rung up that many. No sentinel item marks the
//! end of the stream.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::event::{Actor, EventKind, Item, Observer, QueueEvent};
use crate::queue::BoundedQueue;
use crate::trace::debug;

use super::TaskError;

/// Consumer task descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cashier {
    /// Sum of every shopper's item count.
    pub expected_total: usize,
    /// Pause after each item.
    pub pacing: Option<Duration>,
}

/// Items rung up, in dequeue order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashierReport {
    pub items: Vec<Item>,
}

impl Cashier {
    #[must_use]
    pub const fn new(expected_total: usize) -> Self {
        Self {
            expected_total,
            pacing: None,
        }
    }

    #[must_use]
    pub const fn with_pacing(mut self, pacing: Option<Duration>) -> Self {
        self.pacing = pacing;
        self
    }

    /// Dequeues until `expected_total` items have been processed.
    ///
    /// # Errors
    ///
    /// [`TaskError::QueueClosed`] if the queue closes and drains first.
    pub fn run(
        &self,
        queue: &BoundedQueue<Item>,
        observer: &dyn Observer,
    ) -> Result<CashierReport, TaskError> {
        let mut processed = Vec::with_capacity(self.expected_total);

        while processed.len() < self.expected_total {
            let (item, occupancy) =
                queue
                    .dequeue_blocking()
                    .map_err(|_| TaskError::QueueClosed {
                        actor: Actor::Cashier,
                        completed: processed.len(),
                    })?;
            observer.on_event(&QueueEvent::new(
                Actor::Cashier,
                EventKind::Dequeued,
                item,
                occupancy,
            ));
            processed.push(item);

            if let Some(pause) = self.pacing {
                thread::sleep(pause);
            }
        }

        debug!(total = processed.len(), "cashier finished processing");
        Ok(CashierReport { items: processed })
    }
}
