//! Bounded multi-producer single-consumer checkout queue.
//!
//! Shoppers (producers) place items on a fixed-capacity belt
//! ([`queue::BoundedQueue`]) and a single cashier (consumer) rings them up.
//! Producers block while the belt is full and the cashier blocks while it is
//! empty; neither busy-waits.
//!
//! - [`ring`] - the unsynchronized circular buffer
//! - [`sync`] - counting permits and timeouts
//! - [`queue`] - the blocking bounded queue
//! - [`event`] - observability hook for queue operations
//! - [`runtime`] - shopper and cashier tasks and the orchestrator
//! - [`baseline`] - the unsynchronized variant, for contrast

pub mod baseline;
pub mod event;
pub mod queue;
pub mod ring;
pub mod runtime;
pub mod sync;
mod trace;

pub use trace::init_tracing;
