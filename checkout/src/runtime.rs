//! Simulation runtime: one belt, many shoppers, one cashier.
//!
//! # Architecture
//!
//! [`run`] owns a single [`BoundedQueue`] and lends it to every task thread
//! through [`std::thread::scope`]:
//!
//! ```text
//!  shopper-1 ──┐
//!  shopper-2 ──┼──> BoundedQueue<Item> ──> cashier
//!  shopper-N ──┘
//! ```
//!
//! - One named OS thread per shopper (`shopper-<id>`) and one for the
//!   cashier (`cashier`).
//! - Every task thread holds a guard that closes the queue if the thread
//!   unwinds. A dead shopper would otherwise leave the cashier waiting for
//!   items that never arrive, and a dead cashier would leave shoppers parked
//!   on a full belt.
//! - All threads are joined before the queue is dropped. Any panic or task
//!   error fails the whole run with an error naming the task.
//!
//! # Example
//!
//! ```
//! use checkout::event::NullObserver;
//! use checkout::runtime::{SimulationConfig, run};
//!
//! let config = SimulationConfig::uniform(4, 2, 4);
//! let report = run(&config, &NullObserver)?;
//!
//! assert_eq!(report.consumed.len(), 8);
//! # Ok::<(), checkout::runtime::RunError>(())
//! ```

pub mod cashier;
pub mod shopper;

use std::any::Any;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::event::{Actor, Item, Observer};
use crate::queue::{BoundedQueue, QueueError};
use crate::trace::{debug, error, info, task_span};

pub use cashier::{Cashier, CashierReport};
pub use shopper::{MAX_ITEMS, Shopper, ShopperReport};

/// A task stopped before finishing its work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The queue closed underneath the task.
    #[error("{actor}: queue closed after {completed} item(s)")]
    QueueClosed { actor: Actor, completed: usize },
}

/// Invalid simulation settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("queue capacity must be greater than 0")]
    ZeroCapacity,
    #[error("at least one shopper is required")]
    NoShoppers,
    #[error("shopper-{shopper} has {count} items, at most {max} are allowed", max = MAX_ITEMS)]
    TooManyItems { shopper: u32, count: usize },
    #[error("missing value for {flag}")]
    MissingValue { flag: String },
    #[error("invalid value for {flag}: {value:?}")]
    InvalidValue { flag: String, value: String },
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

/// Failure of a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build queue: {0}")]
    Queue(#[from] QueueError),
    #[error("failed to spawn {task} thread: {source}")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{task} panicked: {message}")]
    TaskPanicked { task: String, message: String },
    #[error("{task} failed: {source}")]
    Task {
        task: String,
        #[source]
        source: TaskError,
    },
}

impl RunError {
    /// Name of the task thread that failed, if the failure came from one.
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::Spawn { task, .. } | Self::TaskPanicked { task, .. } | Self::Task { task, .. } => {
                Some(task.as_str())
            }
            Self::Config(_) | Self::Queue(_) => None,
        }
    }

    /// Panics outrank spawn failures, which outrank the closed-queue errors
    /// both of them cause in the surviving tasks.
    const fn rank(&self) -> u8 {
        match self {
            Self::TaskPanicked { .. } => 0,
            Self::Spawn { .. } => 1,
            Self::Task { .. } => 2,
            Self::Config(_) | Self::Queue(_) => 3,
        }
    }
}

/// Settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Belt capacity.
    pub capacity: usize,
    /// Item count per shopper; shopper ids are assigned 1, 2, ... in order.
    pub shoppers: Vec<usize>,
    /// Pause after each item a shopper places.
    pub shopper_pacing: Option<Duration>,
    /// Pause after each item the cashier rings up.
    pub cashier_pacing: Option<Duration>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::uniform(4, 2, 4)
    }
}

impl SimulationConfig {
    /// `shoppers` shoppers with `items` items each.
    #[must_use]
    pub fn uniform(capacity: usize, shoppers: usize, items: usize) -> Self {
        Self {
            capacity,
            shoppers: vec![items; shoppers],
            shopper_pacing: None,
            cashier_pacing: None,
        }
    }

    /// # Errors
    ///
    /// [`ConfigError::ZeroCapacity`], [`ConfigError::NoShoppers`], or
    /// [`ConfigError::TooManyItems`] when a shopper's ids would overlap the
    /// next shopper's.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.shoppers.is_empty() {
            return Err(ConfigError::NoShoppers);
        }
        if let Some((shopper, &count)) = (1u32..)
            .zip(&self.shoppers)
            .find(|&(_, &count)| count > MAX_ITEMS)
        {
            return Err(ConfigError::TooManyItems { shopper, count });
        }
        Ok(())
    }

    /// Items the cashier must ring up.
    #[must_use]
    pub fn expected_total(&self) -> usize {
        self.shoppers.iter().sum()
    }

    /// Task descriptors for every shopper, ids starting at 1.
    #[must_use]
    pub fn shopper_tasks(&self) -> Vec<Shopper> {
        (1u32..)
            .zip(&self.shoppers)
            .map(|(id, &count)| Shopper::new(id, count).with_pacing(self.shopper_pacing))
            .collect()
    }

    #[must_use]
    pub fn cashier_task(&self) -> Cashier {
        Cashier::new(self.expected_total()).with_pacing(self.cashier_pacing)
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub capacity: usize,
    /// Per-shopper emissions, ordered by shopper id.
    pub produced: Vec<ShopperReport>,
    /// Everything the cashier rang up, in dequeue order.
    pub consumed: Vec<Item>,
    /// Largest belt occupancy seen.
    pub peak_size: usize,
}

impl RunReport {
    #[must_use]
    pub fn total_produced(&self) -> usize {
        self.produced.iter().map(|report| report.items.len()).sum()
    }

    #[must_use]
    pub fn total_consumed(&self) -> usize {
        self.consumed.len()
    }
}

/// Closes the queue when the owning task thread unwinds.
struct CloseOnUnwind<'q, T>(&'q BoundedQueue<T>);

impl<T> Drop for CloseOnUnwind<'_, T> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!(
                task = thread::current().name().unwrap_or("<unnamed>"),
                "task unwinding, closing queue"
            );
            self.0.close();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Keeps the highest-ranked failure; the first one wins ties.
fn record(failure: &mut Option<RunError>, err: RunError) {
    error!(error = %err, "task failed");
    if failure
        .as_ref()
        .is_none_or(|current| err.rank() < current.rank())
    {
        *failure = Some(err);
    }
}

fn join_task<R>(
    name: String,
    handle: thread::ScopedJoinHandle<'_, Result<R, TaskError>>,
    failure: &mut Option<RunError>,
) -> Option<R> {
    debug!(task = %name, "waiting for task to exit");
    match handle.join() {
        Ok(Ok(report)) => Some(report),
        Ok(Err(source)) => {
            record(failure, RunError::Task { task: name, source });
            None
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            record(failure, RunError::TaskPanicked { task: name, message });
            None
        }
    }
}

/// Runs one simulation to completion.
///
/// Spawns every shopper and the cashier against one shared queue, waits for
/// all of them, then tears the queue down.
///
/// # Errors
///
/// - [`RunError::Config`] for invalid settings
/// - [`RunError::Spawn`] if a task thread cannot be started
/// - [`RunError::TaskPanicked`] / [`RunError::Task`] naming the failed task
pub fn run(config: &SimulationConfig, observer: &dyn Observer) -> Result<RunReport, RunError> {
    config.validate()?;

    let queue = BoundedQueue::<Item>::new(config.capacity)?;
    let shoppers = config.shopper_tasks();
    let cashier = config.cashier_task();

    info!(
        capacity = config.capacity,
        shoppers = shoppers.len(),
        expected_total = cashier.expected_total,
        "checkout run starting"
    );

    let outcome = thread::scope(|scope| {
        let queue = &queue;
        let mut failure: Option<RunError> = None;

        let mut shopper_handles = Vec::with_capacity(shoppers.len());
        for shopper in &shoppers {
            let name = Actor::Shopper(shopper.id).to_string();
            debug!(task = %name, "spawning shopper thread");
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(scope, move || {
                    let _span = task_span(thread::current().name().unwrap_or_default());
                    let _guard = CloseOnUnwind(queue);
                    shopper.run(queue, observer)
                });
            match spawned {
                Ok(handle) => shopper_handles.push((name, handle)),
                Err(source) => {
                    record(&mut failure, RunError::Spawn { task: name, source });
                    break;
                }
            }
        }

        let cashier_handle = if failure.is_none() {
            let name = Actor::Cashier.to_string();
            debug!(task = %name, "spawning cashier thread");
            let spawned = thread::Builder::new()
                .name(name.clone())
                .spawn_scoped(scope, move || {
                    let _span = task_span(thread::current().name().unwrap_or_default());
                    let _guard = CloseOnUnwind(queue);
                    cashier.run(queue, observer)
                });
            match spawned {
                Ok(handle) => Some((name, handle)),
                Err(source) => {
                    record(&mut failure, RunError::Spawn { task: name, source });
                    None
                }
            }
        } else {
            None
        };

        if failure.is_some() {
            // Wake whatever already started so the joins below return.
            queue.close();
        }

        let produced: Vec<ShopperReport> = shopper_handles
            .into_iter()
            .filter_map(|(name, handle)| join_task(name, handle, &mut failure))
            .collect();
        let consumed = cashier_handle
            .and_then(|(name, handle)| join_task(name, handle, &mut failure))
            .map(|report| report.items);

        match (failure, consumed) {
            (Some(err), _) => Err(err),
            (None, Some(consumed)) => Ok((produced, consumed)),
            // Cashier always spawns and reports when nothing failed.
            (None, None) => Err(RunError::Queue(QueueError::Closed)),
        }
    });

    let peak_size = queue.peak_len();
    drop(queue);
    debug!("queue torn down");

    let (produced, consumed) = match outcome {
        Ok(reports) => reports,
        Err(err) => {
            error!(error = %err, task = ?err.task(), "checkout run failed");
            return Err(err);
        }
    };

    info!(
        produced = produced.iter().map(|r| r.items.len()).sum::<usize>(),
        consumed = consumed.len(),
        peak_size,
        "checkout run complete"
    );

    Ok(RunReport {
        capacity: config.capacity,
        produced,
        consumed,
        peak_size,
    })
}
