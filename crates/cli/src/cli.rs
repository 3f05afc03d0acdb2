//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// touchfan - fan multitouch frames out to independent consumers
#[derive(Parser, Debug)]
#[command(
    name = "touchfan",
    author,
    version,
    about = "Multitouch frame distribution",
    long_about = "Opens multitouch devices on demand and distributes every sampled frame \n\
                  to the consumers attached to that device, each through its own queue \n\
                  and output."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TOUCHFAN_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TOUCHFAN_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open devices and run the configured consumers
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// List the devices the configured driver enumerates
    Devices(DevicesArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "touchfan.toml", env = "TOUCHFAN_CONFIG")]
    pub config: PathBuf,

    /// Run duration in seconds (0 = until Ctrl+C / SIGTERM)
    #[arg(long, default_value = "0", env = "TOUCHFAN_DURATION")]
    pub duration: u64,

    /// Override the replay speed multiplier
    #[arg(long, env = "TOUCHFAN_REPLAY_SPEED")]
    pub replay_speed: Option<f64>,

    /// Loop replay recordings
    #[arg(long)]
    pub replay_loop: bool,

    /// Interval between delivery statistics samples, in milliseconds
    #[arg(long, default_value = "1000", env = "TOUCHFAN_STATS_INTERVAL_MS")]
    pub stats_interval_ms: u64,

    /// Validate configuration and exit without opening devices
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TOUCHFAN_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "touchfan.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `devices` command
#[derive(Parser, Debug)]
pub struct DevicesArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "touchfan.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
