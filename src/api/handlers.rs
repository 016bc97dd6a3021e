//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error};

use crate::{
    state::{AppState, ElapsedUpdate, TimerPhase},
    timer::TimerCommand,
    utils::format_clock,
};
use super::responses::{HealthResponse, StatusResponse, TimerResponse};

async fn run_command(
    state: &AppState,
    command: TimerCommand,
) -> Result<Json<TimerResponse>, StatusCode> {
    match state.apply(command).await {
        Ok(snapshot) => {
            let message = match snapshot.phase {
                TimerPhase::Running => "Timer running",
                TimerPhase::Paused => "Timer paused",
                TimerPhase::Idle => "Timer idle",
            };
            Ok(Json(TimerResponse::new(message.to_string(), snapshot)))
        }
        Err(e) => {
            error!("Failed to {} timer: {}", command.as_str(), e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Handle POST /timer/start
pub async fn start_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    run_command(&state, TimerCommand::Start).await
}

/// Handle POST /timer/pause
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    run_command(&state, TimerCommand::Pause).await
}

/// Handle POST /timer/toggle
pub async fn toggle_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    run_command(&state, TimerCommand::Toggle).await
}

/// Handle POST /timer/reset
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> Result<Json<TimerResponse>, StatusCode> {
    run_command(&state, TimerCommand::Reset).await
}

/// Handle GET /timer - Return current timer and server status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let timer = state.get_timer_snapshot();
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        display: format_clock(timer.elapsed_seconds),
        timer,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /timer/events - Stream committed elapsed seconds as SSE,
/// starting with the current value
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let updates = state.timer.subscribe();
    let current = ElapsedUpdate { elapsed_seconds: state.timer.elapsed_seconds() };

    let first = stream::once(async move { elapsed_event(current) });
    let rest = stream::unfold(updates, |mut updates| async move {
        loop {
            match updates.recv().await {
                Ok(update) => return Some((elapsed_event(update), updates)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Event stream subscriber lagged by {} updates", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(first.chain(rest)).keep_alive(KeepAlive::default())
}

fn elapsed_event(update: ElapsedUpdate) -> Result<Event, axum::Error> {
    Event::default().event("elapsed").json_data(update)
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
