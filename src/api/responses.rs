//! API response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    state::{TimerPhase, TimerSnapshot},
    utils::format_clock,
};

/// API response structure for timer command endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// `MM:SS` rendering of the elapsed seconds
    pub display: String,
    pub timer: TimerSnapshot,
}

impl TimerResponse {
    pub fn new(message: String, timer: TimerSnapshot) -> Self {
        let status = match timer.phase {
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
            TimerPhase::Idle => "idle",
        };
        Self {
            status: status.to_string(),
            message,
            timestamp: Utc::now(),
            display: format_clock(timer.elapsed_seconds),
            timer,
        }
    }
}

/// Status response with timer and server information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer: TimerSnapshot,
    pub display: String,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
