//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};
use clap::{Parser, ValueEnum};

use crate::{state::BackgroundMode, timer::TimerOptions};

/// Where the background ticker should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackgroundArg {
    /// Dedicated thread with its own runtime
    Isolated,
    /// Task on the server runtime
    SameContext,
    /// Frame sync only
    Disabled,
}

impl From<BackgroundArg> for BackgroundMode {
    fn from(arg: BackgroundArg) -> Self {
        match arg {
            BackgroundArg::Isolated => BackgroundMode::Isolated,
            BackgroundArg::SameContext => BackgroundMode::SameContext,
            BackgroundArg::Disabled => BackgroundMode::Disabled,
        }
    }
}

/// CLI argument parsing structure
#[derive(Debug, Parser)]
#[command(name = "session-clock")]
#[command(about = "A drift-free session timer served over HTTP")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Background ticker period in milliseconds
    #[arg(long, default_value = "100")]
    pub tick_ms: u64,

    /// Frame sync rate in frames per second
    #[arg(long, default_value = "60")]
    pub frame_hz: u32,

    /// Ticker periods of silence before the ticker is restarted
    #[arg(long, default_value = "5")]
    pub stall_multiple: u32,

    /// Consecutive ticker restarts before falling back to frame sync only
    #[arg(long, default_value = "3")]
    pub max_restarts: u32,

    /// Where the background ticker runs
    #[arg(long, value_enum, default_value = "isolated")]
    pub background: BackgroundArg,

    /// Checkpoint file holding the elapsed seconds
    #[arg(short, long, default_value = "session.checkpoint")]
    pub checkpoint: PathBuf,

    /// Minimum seconds between checkpoint writes while running
    #[arg(long, default_value = "5")]
    pub checkpoint_interval: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn checkpoint_interval(&self) -> Duration {
        Duration::from_secs(self.checkpoint_interval.max(1))
    }

    /// Timer tunables derived from the command line
    pub fn timer_options(&self) -> TimerOptions {
        TimerOptions {
            tick_period: Duration::from_millis(self.tick_ms.max(1)),
            frame_period: Duration::from_secs(1) / self.frame_hz.max(1),
            stall_multiple: self.stall_multiple,
            max_restarts: self.max_restarts,
            background: self.background.into(),
        }
    }
}
