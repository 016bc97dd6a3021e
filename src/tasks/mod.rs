//! Background tasks module
//!
//! The timer's two tick producers, the actor loop that owns the controller,
//! and the checkpoint writer that runs alongside the HTTP server.

pub mod background_ticker;
pub mod checkpoint_writer;
pub mod frame_sync;
pub mod timer_driver;

// Re-export main types and functions
pub use background_ticker::BackgroundTicker;
pub use checkpoint_writer::checkpoint_task;
pub use frame_sync::FrameSync;
pub(crate) use timer_driver::timer_task;
