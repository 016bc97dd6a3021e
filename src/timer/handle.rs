//! Cloneable front door to a running timer task

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::debug;

use crate::state::{ElapsedUpdate, TimerSnapshot};

/// Commands accepted by the timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerCommand {
    Start,
    Pause,
    Toggle,
    Reset,
}

impl TimerCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerCommand::Start => "start",
            TimerCommand::Pause => "pause",
            TimerCommand::Toggle => "toggle",
            TimerCommand::Reset => "reset",
        }
    }
}

#[derive(Debug)]
pub(crate) enum TimerRequest {
    Apply {
        command: TimerCommand,
        reply: Option<oneshot::Sender<TimerSnapshot>>,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone)]
pub struct TimerHandle {
    requests: mpsc::UnboundedSender<TimerRequest>,
    snapshot: watch::Receiver<TimerSnapshot>,
    updates: broadcast::Sender<ElapsedUpdate>,
}

impl TimerHandle {
    pub(crate) fn new(
        requests: mpsc::UnboundedSender<TimerRequest>,
        snapshot: watch::Receiver<TimerSnapshot>,
        updates: broadcast::Sender<ElapsedUpdate>,
    ) -> Self {
        Self { requests, snapshot, updates }
    }

    pub fn start(&self) {
        self.fire(TimerCommand::Start);
    }

    pub fn pause(&self) {
        self.fire(TimerCommand::Pause);
    }

    pub fn toggle(&self) {
        self.fire(TimerCommand::Toggle);
    }

    pub fn reset(&self) {
        self.fire(TimerCommand::Reset);
    }

    /// Apply a command and wait for the resulting snapshot
    pub async fn execute(&self, command: TimerCommand) -> Result<TimerSnapshot, String> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(TimerRequest::Apply { command, reply: Some(reply) })
            .map_err(|_| "Timer task is not running".to_string())?;
        response
            .await
            .map_err(|_| format!("Timer task dropped the {} request", command.as_str()))
    }

    /// Last committed elapsed seconds
    pub fn elapsed_seconds(&self) -> u64 {
        self.snapshot.borrow().elapsed_seconds
    }

    pub fn is_running(&self) -> bool {
        self.snapshot.borrow().running
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receive an update on every committed change
    pub fn subscribe(&self) -> broadcast::Receiver<ElapsedUpdate> {
        self.updates.subscribe()
    }

    /// Latest snapshot, updated on any observable change
    pub fn watch(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshot.clone()
    }

    /// Stop the timer task, waiting for its teardown to finish
    pub async fn shutdown(&self) -> Result<(), String> {
        let (done, finished) = oneshot::channel();
        self.requests
            .send(TimerRequest::Shutdown { done })
            .map_err(|_| "Timer task is not running".to_string())?;
        finished
            .await
            .map_err(|_| "Timer task exited before confirming shutdown".to_string())
    }

    /// Queue a command without waiting. Commands are never dropped while the
    /// timer task is alive and are applied in the order they were fired.
    fn fire(&self, command: TimerCommand) {
        if self.requests.send(TimerRequest::Apply { command, reply: None }).is_err() {
            debug!("Timer task gone, ignoring {}", command.as_str());
        }
    }
}
