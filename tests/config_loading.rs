// tests/config_loading.rs

mod common;
use crate::common::{init_tracing, TestResult};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use autopilot::commands;
use autopilot::config::{load_and_validate, reload, undefined_action_references, warn_on_undefined_actions, ActionKind};
use autopilot::errors::AutopilotError;
use autopilot::fs::RealFileSystem;
use autopilot::paths::ProjectPaths;
use autopilot::types::Urgency;

#[test]
fn init_writes_a_loadable_default_config() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let paths = ProjectPaths::new(dir.path());

    assert_eq!(commands::init(&paths, &RealFileSystem)?, 0);
    assert!(paths.log_dir().is_dir());

    let cfg = load_and_validate(paths.config_file())?;
    assert!(cfg.triggers().file_change.enabled);
    assert_eq!(cfg.triggers().file_change.debounce_ms, 1000);
    assert!(cfg.actions().contains_key("lint"));
    assert_eq!(cfg.daemon().smoke_test, vec!["lint", "typecheck"]);

    // Second init leaves a hand-edited file alone.
    std::fs::write(paths.config_file(), "[daemon]\nhealth_check_secs = 9\n")?;
    assert_eq!(commands::init(&paths, &RealFileSystem)?, 0);
    let cfg = load_and_validate(paths.config_file())?;
    assert_eq!(cfg.daemon().health_check_secs, 9);
    Ok(())
}

#[test]
fn hand_written_config_is_parsed() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[triggers.bulk_change]
threshold_count = 5
time_window_ms = 300000
actions = ["page"]

[triggers.error_threshold.categories.deploy]
hourly_limit = 2

[actions.page]
notify = "critical"
retries = 3

[actions.lint]
command = "cargo clippy"
timeout_ms = 30000
category = "lint"

[notifications]
critical = ["log", "pager"]

[notifications.channels.pager]
command = "./page-oncall.sh"
"#,
    )?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.triggers().bulk_change.threshold_count, 5);
    assert_eq!(
        cfg.triggers().error_threshold.categories["deploy"].hourly_limit,
        Some(2)
    );
    assert_eq!(cfg.actions()["page"].kind(), ActionKind::Notify(Urgency::Critical));
    assert_eq!(cfg.actions()["page"].retries, 3);
    assert_eq!(cfg.actions()["lint"].kind(), ActionKind::Command("cargo clippy"));
    assert_eq!(cfg.notifications().channels_for(Urgency::Critical), ["log", "pager"]);
    Ok(())
}

#[test]
fn invalid_config_is_a_config_error() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[actions.broken]\ntimeout_ms = 100\n")?;

    match load_and_validate(&path) {
        Err(AutopilotError::ConfigError(msg)) => assert!(msg.contains("broken"), "{msg}"),
        other => panic!("expected ConfigError, got {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_toml_is_reported() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[daemon\n")?;
    assert!(matches!(load_and_validate(&path), Err(AutopilotError::TomlError(_))));
    Ok(())
}

/// Counts WARN events seen by the thread-local subscriber.
#[derive(Clone, Default)]
struct WarningCounter(Arc<AtomicUsize>);

impl WarningCounter {
    fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

const DANGLING_REFERENCES: &str = r#"
[triggers.file_change]
actions = ["lint", "format"]

[triggers.commit_hook]
actions = ["changelog"]

[actions.lint]
command = "cargo clippy"
"#;

#[test]
fn reloading_does_not_repeat_undefined_action_warnings() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, DANGLING_REFERENCES)?;

    let counter = WarningCounter::default();
    let subscriber = tracing_subscriber::registry().with(counter.clone());
    let reloads = tracing::subscriber::with_default(subscriber, || -> TestResult {
        for _ in 0..5 {
            load_and_validate(&path)?;
        }
        Ok(())
    });
    reloads?;
    assert_eq!(counter.count(), 0);

    let cfg = load_and_validate(&path)?;
    let dangling: Vec<&str> = undefined_action_references(&cfg)
        .into_iter()
        .map(|(_, action)| action)
        .collect();
    assert!(dangling.contains(&"format"));
    assert!(dangling.contains(&"changelog"));
    assert!(!dangling.contains(&"lint"));

    let startup = WarningCounter::default();
    let subscriber = tracing_subscriber::registry().with(startup.clone());
    tracing::subscriber::with_default(subscriber, || warn_on_undefined_actions(&cfg));
    assert_eq!(startup.count(), dangling.len());
    Ok(())
}

#[tokio::test]
async fn reload_runs_off_the_runtime_and_reports_errors() -> TestResult {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("config.toml");
    std::fs::write(&path, DANGLING_REFERENCES)?;
    assert!(reload(path.clone()).await?.actions().contains_key("lint"));

    std::fs::write(&path, "[daemon\n")?;
    assert!(matches!(reload(path).await, Err(AutopilotError::TomlError(_))));
    Ok(())
}
