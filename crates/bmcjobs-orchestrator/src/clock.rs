//! Time source for poll loops
//!
//! Deadlines are computed against [`Clock::now`] and waits go through
//! [`Clock::sleep`], so tests can substitute a clock that advances
//! deterministically.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Monotonic time source and sleeper
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant
    fn now(&self) -> Instant;

    /// Suspend for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Clock backed by the tokio timer
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `false` when cancelled.
pub(crate) async fn sleep_unless_cancelled(
    clock: &dyn Clock,
    cancel: &CancellationToken,
    duration: Duration,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = clock.sleep(duration) => true,
    }
}

/// Shortest wait between two polls of the same controller
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Deadline `timeout` after `start`; `None` when it lies beyond what
/// [`Instant`] can represent, which callers treat as unbounded.
pub(crate) fn deadline_after(start: Instant, timeout: Duration) -> Option<Instant> {
    start.checked_add(timeout)
}

/// Wait before the next poll: the poll interval (at least
/// [`MIN_POLL_INTERVAL`]), clamped to what is left before `deadline`.
pub(crate) fn next_wait(interval: Duration, deadline: Option<Instant>, now: Instant) -> Duration {
    let interval = interval.max(MIN_POLL_INTERVAL);
    match deadline {
        Some(deadline) => interval.min(deadline.saturating_duration_since(now)),
        None => interval,
    }
}
