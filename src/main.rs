// src/main.rs

use autopilot::paths::ProjectPaths;
use autopilot::{cli, logging, run};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("autopilot error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<i32> {
    let args = cli::parse();
    let log_file = args
        .command
        .writes_log_file()
        .then(|| ProjectPaths::new(&args.project).log_file());
    logging::init_logging(args.log_level, log_file.as_deref())?;
    Ok(run(args).await?)
}
