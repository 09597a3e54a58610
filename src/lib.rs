// src/lib.rs

pub mod cli;
pub mod commands;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod instance;
pub mod logging;
pub mod monitor;
pub mod paths;
pub mod shutdown;
pub mod types;
pub mod watch;

use crate::cli::{CliArgs, Command};
use crate::errors::Result;
use crate::fs::RealFileSystem;
use crate::paths::ProjectPaths;

/// High-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    let paths = ProjectPaths::new(args.project);

    match args.command {
        Command::Init => commands::init(&paths, &RealFileSystem),
        Command::Start => commands::start(paths).await,
        Command::Stop => commands::stop(&paths).await,
        Command::Status => commands::status(&paths),
        Command::Logs { lines } => commands::logs(&paths, lines),
        Command::Test => commands::test(&paths, None).await,
    }
}
