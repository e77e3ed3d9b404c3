//! Blocking synchronization primitives used by the checkout queue.
//!
//! - [`permit::Permit`] - closable counting semaphore
//! - [`Timeout`] - wait bound shared by every blocking operation

use std::time::Duration;

pub mod permit;

/// Timeout specification for blocking operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Wait indefinitely.
    Infinite,
    /// Wait for at most the specified duration.
    Duration(Duration),
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        Self::Duration(d)
    }
}
