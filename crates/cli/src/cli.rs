//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Conveyor - transactional stream processor
#[derive(Parser, Debug)]
#[command(
    name = "conveyor",
    author,
    version,
    about = "Transactional stream processor",
    long_about = "Reads newline-delimited messages, runs them through a processor chain \n\
                  and writes them to an output with batching, retries and \n\
                  at-least-once acknowledgement."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "CONVEYOR_VERBOSE")]
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
        env = "CONVEYOR_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a stream: input -> processors -> output
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON); built-in defaults when omitted
    #[arg(short, long, env = "CONVEYOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Read messages from this file instead of stdin
    #[arg(short, long, env = "CONVEYOR_INPUT")]
    pub input: Option<PathBuf>,

    /// Stop the stream after this many seconds (0 = run until input ends)
    #[arg(long, default_value = "0", env = "CONVEYOR_TIMEOUT")]
    pub timeout: u64,

    /// Seconds to wait for in-flight writes during shutdown
    #[arg(long, default_value = "5", env = "CONVEYOR_SHUTDOWN_TIMEOUT")]
    pub shutdown_timeout: u64,

    /// Validate configuration and exit without running the stream
    #[arg(long)]
    pub dry_run: bool,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "CONVEYOR_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "conveyor.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
