//! Session Clock - A drift-free session timer served over HTTP
//!
//! This is the main entry point for the session-clock application.

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use session_clock::{
    api::create_router,
    clock::TokioClock,
    config::Config,
    services::FileCheckpoint,
    state::AppState,
    tasks::checkpoint_task,
    timer::spawn_timer,
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("session_clock={},tower_http=info", config.log_level()))
        .init();

    info!("Starting session-clock server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, tick={}ms, frame={}Hz, background={:?}",
        config.host, config.port, config.tick_ms, config.frame_hz, config.background
    );

    // Seed the timer from the last checkpoint
    let store = FileCheckpoint::new(&config.checkpoint);
    let seed = store.load_seed().await;

    let (timer, timer_task) = spawn_timer(Arc::new(TokioClock), config.timer_options(), seed);

    // Persist committed seconds alongside the server
    let writer = tokio::spawn(checkpoint_task(
        timer.watch(),
        store,
        config.checkpoint_interval(),
    ));

    let state = Arc::new(AppState::new(timer.clone(), config.port, config.host.clone()));
    let app = create_router(state);

    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /timer/start   - Start or resume the session timer");
    info!("  POST /timer/pause   - Pause the session timer");
    info!("  POST /timer/toggle  - Toggle between running and paused");
    info!("  POST /timer/reset   - Reset the session timer to zero");
    info!("  GET  /timer         - Current timer and server status");
    info!("  GET  /timer/events  - Server-sent stream of elapsed seconds");
    info!("  GET  /health        - Health check");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    // Tear down both tick loops, then let the writer make its final save
    if let Err(e) = timer.shutdown().await {
        error!("Timer shutdown failed: {}", e);
    }
    if let Err(e) = timer_task.await {
        error!("Timer task ended abnormally: {}", e);
    }
    if let Err(e) = writer.await {
        error!("Checkpoint writer ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}
