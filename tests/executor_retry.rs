// tests/executor_retry.rs

mod common;
use crate::common::{init_tracing, ConfigBuilder, FakeCommandRunner, RecordingNotifier, TestResult};

use std::sync::Arc;
use std::time::Duration;

use autopilot::config::{ActionSpec, ChannelConfig};
use autopilot::exec::{ActionContext, ActionError, ActionExecutor, CommandStatus};
use autopilot::monitor::ErrorReporter;
use autopilot::types::{TriggerKind, Urgency};

fn ctx() -> ActionContext {
    ActionContext::new(TriggerKind::Manual, "integration test")
}

#[tokio::test]
async fn always_failing_action_runs_retries_plus_one_times() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new().command("lint", "npm run lint", 2).build();
    let runner = FakeCommandRunner::new();
    runner.always("npm run lint", CommandStatus::Failed(1));

    let exec = ActionExecutor::new(&cfg, runner.clone()).with_retry_backoff(Duration::from_millis(1));
    let err = exec.execute("lint", &ctx()).await.unwrap_err();

    assert_eq!(
        err,
        ActionError::NonZeroExit {
            name: "lint".into(),
            code: 1
        }
    );
    assert_eq!(runner.count("npm run lint"), 3);
    Ok(())
}

#[tokio::test]
async fn retry_budget_is_restored_for_every_invocation() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new().command("build", "npm run build", 1).build();
    let runner = FakeCommandRunner::new();
    runner.always("npm run build", CommandStatus::Failed(2));

    let exec = ActionExecutor::new(&cfg, runner.clone()).with_retry_backoff(Duration::from_millis(1));
    for round in 1..=3 {
        assert!(exec.execute("build", &ctx()).await.is_err());
        assert_eq!(runner.count("npm run build"), round * 2);
    }
    Ok(())
}

#[tokio::test]
async fn transient_failure_recovers_within_budget() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new().command("typecheck", "tsc", 2).build();
    let runner = FakeCommandRunner::new();
    runner.script("tsc", [CommandStatus::TimedOut, CommandStatus::Failed(1)]);

    let exec = ActionExecutor::new(&cfg, runner.clone()).with_retry_backoff(Duration::from_millis(1));
    let report = exec.execute("typecheck", &ctx()).await?;
    assert_eq!(report.attempts, 3);
    Ok(())
}

#[tokio::test]
async fn exhausted_action_reports_its_category() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new()
        .action("lint", ActionSpec::command("eslint .", 1_000, 0).with_category("lint"))
        .command("deploy", "./deploy.sh", 0)
        .build();
    let runner = FakeCommandRunner::new();
    runner.always("eslint .", CommandStatus::Failed(1));
    runner.always("./deploy.sh", CommandStatus::TimedOut);

    let (reporter, mut reports) = ErrorReporter::channel(8);
    let exec = ActionExecutor::new(&cfg, runner.clone()).with_error_reporter(reporter);

    assert!(exec.execute("lint", &ctx()).await.is_err());
    assert!(matches!(
        exec.execute("deploy", &ctx()).await,
        Err(ActionError::Timeout { .. })
    ));

    assert_eq!(reports.recv().await.map(|r| r.category), Some("lint".to_string()));
    assert_eq!(reports.recv().await.map(|r| r.category), Some("deploy".to_string()));
    Ok(())
}

#[tokio::test]
async fn notification_fans_out_and_context_urgency_wins() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new()
        .notification("notify_team", Urgency::Low)
        .notifications(|n| {
            n.critical = vec!["team".into(), "broken".into()];
            for name in ["team", "broken"] {
                n.channels.insert(
                    name.into(),
                    ChannelConfig {
                        command: "unused".into(),
                        timeout_ms: 1_000,
                    },
                );
            }
        })
        .build();

    let team = RecordingNotifier::new();
    let broken = RecordingNotifier::failing();
    let exec = ActionExecutor::new(&cfg, FakeCommandRunner::new())
        .with_notifier("team", team.clone())
        .with_notifier("broken", broken.clone());

    let ctx = ActionContext::new(TriggerKind::ErrorThreshold, "build-hourly breached")
        .with_urgency(Urgency::Critical);
    exec.execute("notify_team", &ctx).await?;

    let sent = team.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].urgency, Urgency::Critical);
    assert!(sent[0].message.contains("build-hourly breached"));
    assert_eq!(broken.sent().len(), 1);
    Ok(())
}

#[tokio::test]
async fn notification_fails_when_no_channel_accepts() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new()
        .notification("notify_team", Urgency::High)
        .notifications(|n| {
            n.high = vec!["broken".into()];
            n.channels.insert(
                "broken".into(),
                ChannelConfig {
                    command: "unused".into(),
                    timeout_ms: 1_000,
                },
            );
        })
        .build();

    let exec = ActionExecutor::new(&cfg, FakeCommandRunner::new())
        .with_notifier("broken", RecordingNotifier::failing());
    assert!(matches!(
        exec.execute("notify_team", &ctx()).await,
        Err(ActionError::Notification { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn edited_config_is_picked_up_on_next_invocation() -> TestResult {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let cfg = ConfigBuilder::new().command("lint", "old-lint", 0).write_to(dir.path());
    let config_path = dir.path().join(".autopilot").join("config.toml");

    let runner = FakeCommandRunner::new();
    let exec = ActionExecutor::new(&cfg, runner.clone()).with_config_path(&config_path);
    exec.execute("lint", &ctx()).await?;

    ConfigBuilder::new().command("lint", "new-lint", 0).write_to(dir.path());
    exec.execute("lint", &ctx()).await?;

    // A broken edit keeps the last good table.
    std::fs::write(&config_path, "[actions.lint]\n")?;
    exec.execute("lint", &ctx()).await?;

    assert_eq!(runner.commands(), vec!["old-lint", "new-lint", "new-lint"]);
    Ok(())
}

#[tokio::test]
async fn unknown_action_does_not_touch_the_runner() -> TestResult {
    let cfg = ConfigBuilder::new().build();
    let runner = FakeCommandRunner::new();
    let exec = Arc::new(ActionExecutor::new(&cfg, runner.clone()));
    assert_eq!(
        exec.execute("ghost", &ctx()).await,
        Err(ActionError::UnknownAction("ghost".into()))
    );
    assert!(runner.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn same_action_never_overlaps_but_distinct_actions_do() -> TestResult {
    init_tracing();
    let cfg = ConfigBuilder::new()
        .command("x", "x-cmd", 0)
        .command("y", "y-cmd", 0)
        .build();
    let runner = FakeCommandRunner::new();
    runner.hold("x-cmd", Duration::from_millis(100));
    runner.hold("y-cmd", Duration::from_millis(100));

    let exec = ActionExecutor::new(&cfg, runner.clone());
    let context = ctx();
    let started = std::time::Instant::now();
    let (first, second, other) = tokio::join!(
        exec.execute("x", &context),
        exec.execute("x", &context),
        exec.execute("y", &context),
    );
    first?;
    second?;
    other?;

    assert_eq!(runner.count("x-cmd"), 2);
    assert_eq!(runner.peak_concurrency("x-cmd"), 1);
    assert!(runner.peak_total_concurrency() >= 2, "y should run alongside x");
    assert!(started.elapsed() >= Duration::from_millis(200));
    Ok(())
}
