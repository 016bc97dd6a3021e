//! Session Clock - A drift-free session timer served over HTTP
//!
//! The timer keeps an accurate elapsed-seconds count across pause/resume
//! cycles. Two independently scheduled producers (a background ticker and a
//! display-cadence frame loop) derive elapsed time from the same monotonic
//! reference, and a single controller merges their results so observers only
//! ever see a non-decreasing value.

pub mod api;
pub mod clock;
pub mod config;
pub mod services;
pub mod state;
pub mod tasks;
pub mod timer;
pub mod utils;

// Re-export commonly used types
pub use api::create_router;
pub use clock::{TimeSource, TokioClock};
pub use config::Config;
pub use state::{AppState, TimerSnapshot};
pub use timer::{spawn_timer, TimerCommand, TimerController, TimerHandle, TimerOptions};
pub use utils::signals::shutdown_signal;
