//! Tunables for the timer and its sub-loops

use std::time::Duration;

use crate::state::BackgroundMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerOptions {
    /// Background ticker period
    pub tick_period: Duration,
    /// Frame sync period, roughly one display refresh
    pub frame_period: Duration,
    /// Silence longer than this many tick periods counts as a stall
    pub stall_multiple: u32,
    /// Consecutive restarts before giving up on the background ticker
    pub max_restarts: u32,
    pub background: BackgroundMode,
}

impl TimerOptions {
    /// How long the background ticker may stay silent while running
    pub fn stall_window(&self) -> Duration {
        self.tick_period.saturating_mul(self.stall_multiple.max(1))
    }
}

impl Default for TimerOptions {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(100),
            frame_period: Duration::from_micros(16_667),
            stall_multiple: 5,
            max_restarts: 3,
            background: BackgroundMode::Isolated,
        }
    }
}
