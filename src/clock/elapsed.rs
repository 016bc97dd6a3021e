//! Pure elapsed-time computation

use std::time::Duration;
use tokio::time::Instant;

/// Elapsed time of a timer that was (re)started at `start` after having
/// already accumulated `prior` in earlier run segments.
///
/// A `now` earlier than `start` clamps the running delta to zero instead of
/// going negative, so the result is never below `prior`.
pub fn elapsed(start: Instant, prior: Duration, now: Instant) -> Duration {
    prior.saturating_add(now.saturating_duration_since(start))
}

/// Truncate a duration to whole seconds for display and commits
pub fn whole_seconds(duration: Duration) -> u64 {
    duration.as_secs()
}

/// The copy of the reference instant handed to sub-loops.
///
/// Sub-loops never see `TimerState`; they only get this value when a run
/// segment starts and derive elapsed time from it locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerReference {
    pub start: Instant,
    pub prior: Duration,
}

impl TimerReference {
    pub fn new(start: Instant, prior: Duration) -> Self {
        Self { start, prior }
    }

    /// Elapsed time of this run segment at `now`, including the prior baseline
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        elapsed(self.start, self.prior, now)
    }
}
