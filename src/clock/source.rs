//! Monotonic time sources

use std::{
    fmt::Debug,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::time::Instant;

/// A strictly non-decreasing clock
pub trait TimeSource: Send + Sync + Debug {
    fn now(&self) -> Instant;
}

/// Production clock backed by tokio's monotonic instant.
///
/// Honours a paused test clock on the runtime it is read from. A ticker
/// running in its own runtime reads that runtime's clock instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TimeSource for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Hand-driven clock. Clones share the same offset.
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset = offset.saturating_add(by);
        }
    }

    /// Jump to an absolute offset from the base instant, backwards included.
    /// Only useful for simulating clock anomalies.
    pub fn set_offset(&self, to: Duration) {
        if let Ok(mut offset) = self.offset.lock() {
            *offset = to;
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().map(|o| *o).unwrap_or_default();
        self.base + offset
    }
}
