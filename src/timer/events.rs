//! Messages flowing from the sub-loops to the controller

use tokio::time::Instant;

/// Emitted by the background ticker every period
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackgroundTick {
    pub run_id: u64,
    /// Total elapsed milliseconds, prior segments included
    pub elapsed_ms: u64,
    /// When the tick left the ticker; the stall watchdog measures silence from here
    pub emitted_at: Instant,
}

/// Emitted by frame sync when the whole-seconds value grows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTick {
    pub run_id: u64,
    pub seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Background(BackgroundTick),
    Frame(FrameTick),
}

impl TimerEvent {
    pub fn run_id(&self) -> u64 {
        match self {
            TimerEvent::Background(tick) => tick.run_id,
            TimerEvent::Frame(tick) => tick.run_id,
        }
    }

    /// Candidate whole seconds carried by this event
    pub fn candidate_seconds(&self) -> u64 {
        match self {
            TimerEvent::Background(tick) => tick.elapsed_ms / 1000,
            TimerEvent::Frame(tick) => tick.seconds,
        }
    }
}
