// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `autopilot`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "autopilot",
    version,
    about = "Workflow automation daemon: watch a project and run remediation and notification actions.",
    long_about = None
)]
pub struct CliArgs {
    /// Project root. Config, logs and the instance lock live under
    /// `<PROJECT>/.autopilot/`.
    #[arg(long, global = true, value_name = "DIR", default_value = ".")]
    pub project: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `AUTOPILOT_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Create the default configuration and log directory if missing.
    Init,
    /// Run the daemon in the foreground until stopped.
    Start,
    /// Ask the running daemon to shut down and wait for it.
    Stop,
    /// Report whether a daemon is running for this project.
    Status,
    /// Print the last lines of the daemon log.
    Logs {
        /// Number of lines to print.
        #[arg(default_value_t = 50)]
        lines: usize,
    },
    /// Run the configured smoke-test actions once.
    Test,
}

impl Command {
    /// Whether this command should also log to the daemon log file.
    pub fn writes_log_file(&self) -> bool {
        matches!(self, Command::Start | Command::Test)
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
