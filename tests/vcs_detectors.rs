// tests/vcs_detectors.rs

mod common;
use crate::common::{dispatcher_for, files_env, init_tracing, ConfigBuilder, FakeChangeSource, FakeCommandRunner};

use std::time::Duration;

use proptest::prelude::*;
use tokio::time::Instant;

use autopilot::monitor::{BulkChangeDetector, BulkChangeHistory, CommitWatcher};

fn changed(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("src/module{i}.ts")).collect()
}

#[tokio::test]
async fn bulk_change_fires_once_per_window() {
    init_tracing();
    let cfg = ConfigBuilder::new()
        .command("review", "review-cmd", 0)
        .bulk_change(|t| {
            t.threshold_count = 5;
            t.time_window_ms = 300_000;
            t.actions = vec!["review".into()];
        })
        .build();
    let runner = FakeCommandRunner::new();
    let source = FakeChangeSource::new();
    source.push_changed(&changed(7));

    let mut detector = BulkChangeDetector::new(
        &cfg.triggers().bulk_change,
        source.clone(),
        dispatcher_for(&cfg, runner.clone()),
    );
    detector.poll_once().await;
    detector.poll_once().await;

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(files_env(&calls[0]).len(), 7);
}

#[tokio::test]
async fn small_change_sets_never_fire() {
    let cfg = ConfigBuilder::new()
        .command("review", "review-cmd", 0)
        .bulk_change(|t| {
            t.threshold_count = 5;
            t.actions = vec!["review".into()];
        })
        .build();
    let runner = FakeCommandRunner::new();
    let source = FakeChangeSource::new();
    source.push_changed(&changed(4));

    let mut detector =
        BulkChangeDetector::new(&cfg.triggers().bulk_change, source, dispatcher_for(&cfg, runner.clone()));
    detector.poll_once().await;

    assert!(runner.calls().is_empty());
}

#[test]
fn bulk_change_fires_again_after_the_window_elapses() {
    let mut history = BulkChangeHistory::new(5, Duration::from_secs(300));
    let t0 = Instant::now();
    let files = changed(7);

    assert!(history.evaluate(t0, &files).is_some());
    assert!(history.evaluate(t0 + Duration::from_secs(10), &files).is_none());
    assert!(history.evaluate(t0 + Duration::from_secs(360), &files).is_some());
}

#[tokio::test]
async fn commit_watcher_fires_only_when_head_moves() {
    let cfg = ConfigBuilder::new()
        .command("changelog", "changelog-cmd", 0)
        .commit_hook(|t| t.actions = vec!["changelog".into()])
        .build();
    let runner = FakeCommandRunner::new();
    let source = FakeChangeSource::new();
    source.push_head("aaa111");
    source.push_head("aaa111");
    source.push_head("bbb222");

    let mut watcher =
        CommitWatcher::new(&cfg.triggers().commit_hook, source, dispatcher_for(&cfg, runner.clone()));
    for _ in 0..4 {
        watcher.poll_once().await;
    }

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    let message = calls[0]
        .env
        .iter()
        .find(|(k, _)| k == "AUTOPILOT_MESSAGE")
        .map(|(_, v)| v.clone())
        .unwrap_or_default();
    assert!(message.contains("bbb222"));
}

proptest! {
    #[test]
    fn at_most_one_firing_inside_any_window(
        offsets in proptest::collection::vec(0u64..3_000, 1..60),
        sizes in proptest::collection::vec(0usize..12, 1..60),
    ) {
        let window = Duration::from_secs(300);
        let mut history = BulkChangeHistory::new(5, window);
        let t0 = Instant::now();

        let mut offsets = offsets;
        offsets.sort_unstable();

        let mut fired_at: Vec<u64> = Vec::new();
        for (offset, size) in offsets.iter().zip(sizes.iter().cycle()) {
            let now = t0 + Duration::from_secs(*offset);
            if history.evaluate(now, &changed(*size)).is_some() {
                prop_assert!(*size >= 5);
                fired_at.push(*offset);
            }
        }

        for pair in fired_at.windows(2) {
            prop_assert!(pair[1] - pair[0] >= window.as_secs());
        }
    }
}
