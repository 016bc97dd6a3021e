//! Observer-facing views of the timer

use serde::{Deserialize, Serialize};

use super::{TimerPhase, TimerState};

/// How the background ticker is being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMode {
    /// Dedicated thread with its own runtime
    Isolated,
    /// Task on the caller's runtime
    SameContext,
    /// No background ticker; frame sync only
    Disabled,
}

impl BackgroundMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundMode::Isolated => "isolated",
            BackgroundMode::SameContext => "same_context",
            BackgroundMode::Disabled => "disabled",
        }
    }
}

/// Non-fatal notices surfaced to the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    /// The background ticker could not be kept alive; timing continues on
    /// frame sync alone
    ReducedPrecision,
}

/// Everything an observer needs to render the timer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub elapsed_seconds: u64,
    pub running: bool,
    pub phase: TimerPhase,
    pub background: BackgroundMode,
    pub advisory: Option<Advisory>,
}

impl TimerSnapshot {
    pub fn capture(state: &TimerState, background: BackgroundMode, advisory: Option<Advisory>) -> Self {
        Self {
            elapsed_seconds: state.committed_seconds,
            running: state.is_running(),
            phase: state.phase,
            background,
            advisory,
        }
    }
}

/// Pushed to subscribers on every committed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElapsedUpdate {
    pub elapsed_seconds: u64,
}
