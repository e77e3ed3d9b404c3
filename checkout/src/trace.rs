//! Logging for checkout runs.
//!
//! With `--features tracing` the macros below are the `tracing` ones and each
//! task thread logs inside a span named after its actor. Without the feature
//! every macro expands to nothing and [`task_span`] returns a unit guard.

/// Filter used when `RUST_LOG` is unset.
#[cfg(feature = "tracing")]
const DEFAULT_FILTER: &str = "checkout=debug";

/// Installs a stderr subscriber filtered by `RUST_LOG` (default
/// `checkout=debug`), with thread names and uptime stamps.
///
/// Returns `false` if a global subscriber was already installed, so tests
/// may call it more than once.
#[cfg(feature = "tracing")]
pub fn init_tracing() -> bool {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let events = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_names(true)
        .with_timer(fmt::time::uptime());

    tracing_subscriber::registry()
        .with(events)
        .with(filter)
        .try_init()
        .is_ok()
}

#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() -> bool {
    false
}

/// Span covering one task thread; records stay tagged with the actor even
/// where the thread name is not printed.
#[cfg(feature = "tracing")]
pub(crate) fn task_span(actor: &str) -> tracing::span::EnteredSpan {
    tracing::debug_span!("task", actor).entered()
}

#[cfg(not(feature = "tracing"))]
pub(crate) const fn task_span(_actor: &str) {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use {
    discard as debug, discard as error, discard as info, discard as trace, discard as warn,
};
