//! Closable counting semaphore.
//!
//! A [`Permit`] holds a count of available units. [`Permit::acquire`] parks
//! the calling thread while the count is zero and takes one unit once it is
//! positive; [`Permit::release`] returns a unit and wakes one waiter.
//!
//! [`Permit::close`] is the shutdown signal: every parked waiter wakes, and
//! acquisitions that would otherwise block fail with
//! [`AcquireError::Closed`]. Units still available after closing can be
//! taken, which lets a consumer drain a closed queue.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use minstant::Instant;
use thiserror::Error;

use super::Timeout;

/// Reasons a blocking acquisition gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AcquireError {
    /// The permit was closed while no units were available.
    #[error("permit closed")]
    Closed,
    /// The timeout elapsed before a unit became available.
    #[error("timed out waiting for a permit")]
    TimedOut,
}

/// Reasons a non-blocking acquisition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TryAcquireError {
    /// No units available right now.
    #[error("no permits available")]
    Empty,
    /// The permit was closed while no units were available.
    #[error("permit closed")]
    Closed,
}

#[derive(Debug)]
struct PermitState {
    count: usize,
    closed: bool,
}

/// Counting semaphore built on `Mutex` + `Condvar`.
#[derive(Debug)]
pub struct Permit {
    state: Mutex<PermitState>,
    available: Condvar,
}

impl Permit {
    /// Creates a permit holding `initial` units.
    #[must_use]
    pub const fn new(initial: usize) -> Self {
        Self {
            state: Mutex::new(PermitState {
                count: initial,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// No code panics while this lock is held, so a poisoned guard still
    /// protects a consistent count.
    fn lock(&self) -> MutexGuard<'_, PermitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes one unit, waiting up to `timeout` for one to become available.
    ///
    /// # Errors
    ///
    /// [`AcquireError::Closed`] if the permit is closed and empty,
    /// [`AcquireError::TimedOut`] if the deadline passes first.
    pub fn acquire(&self, timeout: Timeout) -> Result<(), AcquireError> {
        // A deadline past the clock's range waits forever.
        let deadline = match timeout {
            Timeout::Infinite => None,
            Timeout::Duration(d) => Instant::now().checked_add(d),
        };

        let mut state = self.lock();
        loop {
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }
            if state.closed {
                return Err(AcquireError::Closed);
            }

            // Spurious wakeups land back at the top of the loop.
            state = match deadline {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(dl) => {
                    let remaining = match dl.checked_duration_since(Instant::now()) {
                        Some(d) if !d.is_zero() => d,
                        _ => return Err(AcquireError::TimedOut),
                    };
                    self.available
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Takes one unit if one is available right now.
    ///
    /// # Errors
    ///
    /// [`TryAcquireError::Empty`] if the count is zero,
    /// [`TryAcquireError::Closed`] if it is zero and the permit is closed.
    pub fn try_acquire(&self) -> Result<(), TryAcquireError> {
        let mut state = self.lock();
        if state.count > 0 {
            state.count -= 1;
            Ok(())
        } else if state.closed {
            Err(TryAcquireError::Closed)
        } else {
            Err(TryAcquireError::Empty)
        }
    }

    /// Returns one unit and wakes one waiter.
    pub fn release(&self) {
        let mut state = self.lock();
        state.count += 1;
        drop(state);
        self.available.notify_one();
    }

    /// Closes the permit and wakes every waiter. Idempotent.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        drop(state);
        self.available.notify_all();
    }

    /// Units currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.lock().count
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_release() {
        let permit = Permit::new(2);

        permit.acquire(Timeout::Infinite).unwrap();
        permit.acquire(Timeout::Infinite).unwrap();
        assert_eq!(permit.available(), 0);
        assert_eq!(permit.try_acquire(), Err(TryAcquireError::Empty));

        permit.release();
        assert_eq!(permit.available(), 1);
        assert_eq!(permit.try_acquire(), Ok(()));
    }

    #[test]
    fn acquire_times_out_when_empty() {
        let permit = Permit::new(0);

        let result = permit.acquire(Timeout::Duration(Duration::from_millis(20)));
        assert_eq!(result, Err(AcquireError::TimedOut));
        assert_eq!(permit.available(), 0);
    }

    #[test]
    fn zero_timeout_takes_available_unit() {
        let permit = Permit::new(1);

        assert_eq!(permit.acquire(Duration::ZERO.into()), Ok(()));
        assert_eq!(
            permit.acquire(Duration::ZERO.into()),
            Err(AcquireError::TimedOut)
        );
    }

    #[test]
    fn unbounded_duration_waits_for_release() {
        let permit = Arc::new(Permit::new(0));
        let waiter = {
            let permit = Arc::clone(&permit);
            thread::spawn(move || permit.acquire(Timeout::Duration(Duration::MAX)))
        };

        thread::sleep(Duration::from_millis(20));
        permit.release();

        assert_eq!(waiter.join().unwrap(), Ok(()));
        assert_eq!(permit.try_acquire(), Err(TryAcquireError::Empty));
    }

    #[test]
    fn release_wakes_blocked_waiter() {
        let permit = Arc::new(Permit::new(0));
        let waiter = {
            let permit = Arc::clone(&permit);
            thread::spawn(move || permit.acquire(Timeout::Infinite))
        };

        thread::sleep(Duration::from_millis(20));
        permit.release();

        assert_eq!(waiter.join().unwrap(), Ok(()));
        assert_eq!(permit.available(), 0);
    }

    #[test]
    fn close_wakes_all_waiters() {
        let permit = Arc::new(Permit::new(0));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let permit = Arc::clone(&permit);
                thread::spawn(move || permit.acquire(Timeout::Infinite))
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        permit.close();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(AcquireError::Closed));
        }
        assert!(permit.is_closed());
    }

    #[test]
    fn closed_permit_drains_remaining_units() {
        let permit = Permit::new(2);
        permit.close();

        assert_eq!(permit.acquire(Timeout::Infinite), Ok(()));
        assert_eq!(permit.try_acquire(), Ok(()));
        assert_eq!(permit.try_acquire(), Err(TryAcquireError::Closed));
        assert_eq!(permit.acquire(Timeout::Infinite), Err(AcquireError::Closed));
    }
}
