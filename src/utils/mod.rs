//! Utility functions module
//!
//! Signal handling and display formatting shared across the server.

pub mod format;
pub mod signals;

// Re-export main functions
pub use format::{format_clock, format_uptime};
pub use signals::shutdown_signal;
