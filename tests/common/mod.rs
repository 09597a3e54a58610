#![allow(dead_code)]

use std::sync::Arc;

use autopilot::config::ConfigFile;
use autopilot::engine::{DispatchTable, Dispatcher};
use autopilot::exec::{ActionExecutor, CommandRequest, CommandRunner};

pub use autopilot_test_utils::builders::ConfigBuilder;
pub use autopilot_test_utils::fakes::{FakeChangeSource, FakeCommandRunner, RecordingNotifier};
pub use autopilot_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Dispatcher over an executor built from `config` and `runner`.
pub fn dispatcher_for(config: &ConfigFile, runner: Arc<dyn CommandRunner>) -> Dispatcher {
    let executor = ActionExecutor::new(config, runner);
    Dispatcher::new(Arc::new(executor), DispatchTable::from_config(config))
}

/// `AUTOPILOT_FILES` of a recorded request, split into paths.
pub fn files_env(request: &CommandRequest) -> Vec<String> {
    request
        .env
        .iter()
        .find(|(k, _)| k == "AUTOPILOT_FILES")
        .map(|(_, v)| v.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
