//! Elapsed-time arithmetic and monotonic time sources
//!
//! Every component that needs to know "how long has the timer run" goes
//! through [`elapsed`]; nothing in this crate reads wall-clock time for that.

pub mod elapsed;
pub mod source;

pub use elapsed::{elapsed, whole_seconds, TimerReference};
pub use source::{ManualClock, TimeSource, TokioClock};
