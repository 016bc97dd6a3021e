//! Main application state management

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::{
    timer::{TimerCommand, TimerHandle},
    utils::format_uptime,
};
use super::TimerSnapshot;

/// Shared server state handed to every request handler
#[derive(Debug)]
pub struct AppState {
    /// Handle to the running session timer
    pub timer: TimerHandle,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl AppState {
    pub fn new(timer: TimerHandle, port: u16, host: String) -> Self {
        Self {
            timer,
            start_time: Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
        }
    }

    /// Apply a timer command, record it as the last action and return the
    /// resulting snapshot
    pub async fn apply(&self, command: TimerCommand) -> Result<TimerSnapshot, String> {
        let snapshot = self.timer.execute(command).await?;
        info!(
            "Timer {} -> {}s (running={})",
            command.as_str(),
            snapshot.elapsed_seconds,
            snapshot.running
        );

        match self.last_action.lock() {
            Ok(mut last_action) => *last_action = Some(command.as_str().to_string()),
            Err(e) => warn!("Failed to record last action: {}", e),
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }

        Ok(snapshot)
    }

    /// Current timer snapshot
    pub fn get_timer_snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot()
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        format_uptime(self.start_time.elapsed())
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }
}
