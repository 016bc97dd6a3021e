//! Timer actor loop
//!
//! Serializes handle commands, sub-loop events and the stall watchdog onto
//! one task so the controller is never touched from two places at once.

use tokio::{
    sync::mpsc,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::timer::{TimerController, TimerEvent, TimerRequest};

/// Drive `controller` until a shutdown request arrives or every handle is gone
pub(crate) async fn timer_task(
    mut controller: TimerController,
    mut events: mpsc::UnboundedReceiver<TimerEvent>,
    mut requests: mpsc::UnboundedReceiver<TimerRequest>,
) {
    info!(
        "Starting timer task (background={}, elapsed={}s)",
        controller.background_mode().as_str(),
        controller.elapsed_seconds()
    );

    let mut watchdog = interval(controller.options().tick_period);
    watchdog.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut shutdown_ack = None;

    loop {
        tokio::select! {
            biased;

            request = requests.recv() => match request {
                Some(TimerRequest::Apply { command, reply }) => {
                    debug!("Applying timer command: {}", command.as_str());
                    let snapshot = controller.apply(command);
                    if let Some(reply) = reply {
                        if reply.send(snapshot).is_err() {
                            debug!("Requester went away before the {} reply", command.as_str());
                        }
                    }
                }
                Some(TimerRequest::Shutdown { done }) => {
                    info!("Timer shutdown requested");
                    shutdown_ack = Some(done);
                    break;
                }
                None => {
                    info!("All timer handles dropped, stopping timer task");
                    break;
                }
            },

            Some(event) = events.recv() => controller.handle_event(event),

            _ = watchdog.tick() => controller.check_background(),
        }
    }

    controller.shutdown().await;
    if let Some(done) = shutdown_ack {
        let _ = done.send(());
    }
}
