//! Display-cadence elapsed-time loop
//!
//! Re-reads the clock every frame but only publishes when the whole-seconds
//! value moves forward, so observers re-render at most once a second.

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, trace};

use crate::{
    clock::{whole_seconds, TimeSource, TimerReference},
    timer::{FrameTick, TimerEvent},
};

#[derive(Debug)]
pub struct FrameSync {
    frame_period: Duration,
    task: Option<JoinHandle<()>>,
}

impl FrameSync {
    pub fn new(frame_period: Duration) -> Self {
        Self { frame_period, task: None }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start the per-frame loop for a run segment. No-op if already running.
    pub fn start(
        &mut self,
        run_id: u64,
        reference: TimerReference,
        clock: Arc<dyn TimeSource>,
        events: mpsc::UnboundedSender<TimerEvent>,
    ) {
        if self.is_running() {
            return;
        }
        self.task = Some(tokio::spawn(frame_loop(
            run_id,
            reference,
            clock,
            self.frame_period,
            events,
        )));
    }

    /// Cancel the loop; no frame is scheduled after this returns
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn frame_loop(
    run_id: u64,
    reference: TimerReference,
    clock: Arc<dyn TimeSource>,
    frame_period: Duration,
    events: mpsc::UnboundedSender<TimerEvent>,
) {
    let mut last_published = whole_seconds(reference.prior);
    let mut frames = interval(frame_period);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        frames.tick().await;
        let seconds = whole_seconds(reference.elapsed_at(clock.now()));
        if seconds < last_published {
            trace!("Discarding frame value {} below {}", seconds, last_published);
            continue;
        }
        if seconds == last_published {
            continue;
        }
        last_published = seconds;
        if events.send(TimerEvent::Frame(FrameTick { run_id, seconds })).is_err() {
            debug!("Timer controller gone, stopping frame loop");
            break;
        }
    }
}
