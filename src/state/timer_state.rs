//! Timer state structure and management

use std::time::Duration;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::clock::{elapsed, whole_seconds, TimerReference};

/// Lifecycle phase of the session timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    /// Never started since the last reset
    Idle,
    Running,
    Paused,
}

/// Canonical timer state, owned exclusively by the controller
#[derive(Debug, Clone)]
pub struct TimerState {
    pub phase: TimerPhase,
    /// Instant of the last start/resume; `None` unless running
    pub start_instant: Option<Instant>,
    /// Elapsed time folded in from earlier run segments
    pub prior_elapsed: Duration,
    /// Last value published to observers
    pub committed_seconds: u64,
}

impl TimerState {
    /// Create an idle timer at zero
    pub fn new() -> Self {
        Self::seeded(0)
    }

    /// Create an idle timer continuing from a persisted checkpoint
    pub fn seeded(seconds: u64) -> Self {
        Self {
            phase: TimerPhase::Idle,
            start_instant: None,
            prior_elapsed: Duration::from_secs(seconds),
            committed_seconds: seconds,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    /// Total elapsed time at `now`
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        match self.start_instant {
            Some(start) if self.is_running() => elapsed(start, self.prior_elapsed, now),
            _ => self.prior_elapsed,
        }
    }

    /// Reference handed to sub-loops for the current run segment
    pub fn reference(&self) -> Option<TimerReference> {
        self.start_instant
            .map(|start| TimerReference::new(start, self.prior_elapsed))
    }

    /// Enter `Running` at `now`. Returns false if already running.
    pub fn begin_segment(&mut self, now: Instant) -> bool {
        if self.is_running() {
            return false;
        }
        self.phase = TimerPhase::Running;
        self.start_instant = Some(now);
        true
    }

    /// Leave `Running`, folding the segment into the prior baseline.
    /// Returns false if not running.
    pub fn end_segment(&mut self, now: Instant) -> bool {
        if !self.is_running() {
            return false;
        }
        let total = self.elapsed_at(now);
        self.prior_elapsed = total;
        self.start_instant = None;
        self.phase = TimerPhase::Paused;
        self.committed_seconds = self.committed_seconds.max(whole_seconds(total));
        true
    }

    /// Commit `candidate` if it moves the committed value forward while running
    pub fn try_commit(&mut self, candidate: u64) -> bool {
        if !self.is_running() || candidate <= self.committed_seconds {
            return false;
        }
        self.committed_seconds = candidate;
        true
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::new()
    }
}
