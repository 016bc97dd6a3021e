//! State management module
//!
//! The canonical timer state, the views of it handed to observers, and the
//! shared server state.

pub mod app_state;
pub mod snapshot;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use snapshot::{Advisory, BackgroundMode, ElapsedUpdate, TimerSnapshot};
pub use timer_state::{TimerPhase, TimerState};
