//! External collaborator module
//!
//! Persistence of the integer-seconds checkpoint lives here; the timer core
//! only exposes the value to be saved.

pub mod checkpoint;

// Re-export main types
pub use checkpoint::FileCheckpoint;
