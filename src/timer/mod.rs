//! Session timer
//!
//! The controller owns the timer state; the handle is how everything else
//! talks to it once it runs inside [`crate::tasks::timer_task`].

pub mod controller;
pub mod events;
pub mod handle;
pub mod options;

use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{clock::TimeSource, tasks::timer_task};

pub use controller::TimerController;
pub use events::{BackgroundTick, FrameTick, TimerEvent};
pub use handle::{TimerCommand, TimerHandle};
pub(crate) use handle::TimerRequest;
pub use options::TimerOptions;

/// Build a controller seeded with `seed_seconds` and run it on a background
/// task. Must be called from within a tokio runtime.
pub fn spawn_timer(
    clock: Arc<dyn TimeSource>,
    options: TimerOptions,
    seed_seconds: u64,
) -> (TimerHandle, JoinHandle<()>) {
    let (controller, events) = TimerController::new(clock, options, seed_seconds);
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    let handle = TimerHandle::new(requests_tx, controller.watch(), controller.updates_sender());

    let task = tokio::spawn(timer_task(controller, events, requests_rx));
    (handle, task)
}
