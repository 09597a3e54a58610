// src/monitor/threshold.rs

//! ThresholdMonitor: rolling hourly/daily error counters per category.
//!
//! - Counters only grow between resets; resets follow a [`ResetClock`]
//!   re-derived from local wall-clock time (top of the hour, midnight),
//!   never from the increment path.
//! - Evaluation runs on a separate interval and reports each
//!   `<category>-hourly` / `<category>-daily` breach at most once per reset
//!   period.
//! - Increments arrive as messages from other components through an
//!   [`ErrorReporter`]; only this monitor's task touches the counters.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use tokio::sync::mpsc;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{CategoryLimits, ErrorThresholdTrigger};
use crate::engine::{Condition, Dispatcher};
use crate::shutdown::ShutdownToken;

/// A classified error reported by another component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReport {
    pub category: String,
}

/// Cloneable handle for reporting errors to the monitor.
#[derive(Debug, Clone)]
pub struct ErrorReporter {
    tx: mpsc::Sender<ErrorReport>,
}

impl ErrorReporter {
    /// Create a reporter and the receiving end for [`ThresholdMonitor`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ErrorReport>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Never blocks; drops the report (with a warning) if the monitor lags.
    pub fn report(&self, category: &str) {
        let report = ErrorReport {
            category: category.to_string(),
        };
        if let Err(e) = self.tx.try_send(report) {
            warn!(category, error = %e, "could not record error for threshold monitor");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreachWindow {
    Hourly,
    Daily,
}

impl fmt::Display for BreachWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreachWindow::Hourly => f.write_str("hourly"),
            BreachWindow::Daily => f.write_str("daily"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breach {
    pub category: String,
    pub window: BreachWindow,
    pub count: u32,
    pub limit: u32,
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}: {} errors (limit {})",
            self.category, self.window, self.count, self.limit
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryCounter {
    pub hourly: u32,
    pub daily: u32,
    hourly_notified: bool,
    daily_notified: bool,
}

impl CategoryCounter {
    pub fn hourly_notified(&self) -> bool {
        self.hourly_notified
    }

    pub fn daily_notified(&self) -> bool {
        self.daily_notified
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorCounters {
    counters: BTreeMap<String, CategoryCounter>,
}

impl ErrorCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, category: &str) -> Option<CategoryCounter> {
        self.counters.get(category).copied()
    }

    pub fn increment(&mut self, category: &str, by: u32) {
        let counter = self.counters.entry(category.to_string()).or_default();
        counter.hourly = counter.hourly.saturating_add(by);
        counter.daily = counter.daily.saturating_add(by);
    }

    pub fn reset_hourly(&mut self) {
        for counter in self.counters.values_mut() {
            counter.hourly = 0;
            counter.hourly_notified = false;
        }
    }

    pub fn reset_daily(&mut self) {
        for counter in self.counters.values_mut() {
            counter.daily = 0;
            counter.daily_notified = false;
        }
    }

    /// Breaches (`count > limit`) not yet reported in the current period.
    pub fn evaluate(&mut self, limits: &BTreeMap<String, CategoryLimits>) -> Vec<Breach> {
        let mut breaches = Vec::new();

        for (category, limit) in limits.iter() {
            let Some(counter) = self.counters.get_mut(category) else {
                continue;
            };

            if let Some(daily_limit) = limit.daily_limit {
                if counter.daily > daily_limit && !counter.daily_notified {
                    counter.daily_notified = true;
                    breaches.push(Breach {
                        category: category.clone(),
                        window: BreachWindow::Daily,
                        count: counter.daily,
                        limit: daily_limit,
                    });
                }
            }

            if let Some(hourly_limit) = limit.hourly_limit {
                if counter.hourly > hourly_limit && !counter.hourly_notified {
                    counter.hourly_notified = true;
                    breaches.push(Breach {
                        category: category.clone(),
                        window: BreachWindow::Hourly,
                        count: counter.hourly,
                        limit: hourly_limit,
                    });
                }
            }
        }

        breaches
    }
}

/// Wall-clock instants of the next hourly and daily resets.
///
/// Boundaries are recomputed from the clock each time they fire, so a late
/// wake-up resets once and the following boundary is still the next top of
/// the hour or the next local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetClock {
    next_hour: NaiveDateTime,
    next_midnight: NaiveDateTime,
}

/// Which resets are due at a given instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetsDue {
    pub hourly: bool,
    pub daily: bool,
}

impl ResetClock {
    pub fn starting_at(now: NaiveDateTime) -> Self {
        Self {
            next_hour: top_of_next_hour(now),
            next_midnight: next_midnight(now),
        }
    }

    pub fn next_hour(&self) -> NaiveDateTime {
        self.next_hour
    }

    pub fn next_midnight(&self) -> NaiveDateTime {
        self.next_midnight
    }

    /// Time left until the earlier boundary; at least 1ms.
    pub fn until_next(&self, now: NaiveDateTime) -> Duration {
        let next = self.next_hour.min(self.next_midnight);
        (next - now)
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_millis(1))
    }

    /// Resets due at `now`. Boundaries that fired are moved past `now`.
    pub fn due(&mut self, now: NaiveDateTime) -> ResetsDue {
        let mut due = ResetsDue::default();
        if now >= self.next_hour {
            due.hourly = true;
            self.next_hour = top_of_next_hour(now);
        }
        if now >= self.next_midnight {
            due.daily = true;
            self.next_midnight = next_midnight(now);
        }
        due
    }
}

fn top_of_next_hour(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(NaiveTime::MIN) + TimeDelta::hours(i64::from(now.hour()) + 1)
}

fn next_midnight(now: NaiveDateTime) -> NaiveDateTime {
    now.date().and_time(NaiveTime::MIN) + TimeDelta::days(1)
}

pub struct ThresholdMonitor {
    counters: ErrorCounters,
    config: ErrorThresholdTrigger,
    reports: mpsc::Receiver<ErrorReport>,
    dispatcher: Dispatcher,
}

impl fmt::Debug for ThresholdMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdMonitor")
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl ThresholdMonitor {
    pub fn new(
        config: ErrorThresholdTrigger,
        reports: mpsc::Receiver<ErrorReport>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            counters: ErrorCounters::new(),
            config,
            reports,
            dispatcher,
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownToken) {
        let mut resets = ResetClock::starting_at(Local::now().naive_local());
        let evaluate_every = self.config.evaluate_interval();
        let mut evaluate = interval_at(Instant::now() + evaluate_every, evaluate_every);
        evaluate.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            categories = self.config.categories.len(),
            evaluate_secs = self.config.evaluate_secs,
            "threshold monitor started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(report) = self.reports.recv() => {
                    debug!(category = %report.category, "error recorded");
                    self.counters.increment(&report.category, 1);
                }
                _ = sleep(resets.until_next(Local::now().naive_local())) => {
                    let due = resets.due(Local::now().naive_local());
                    if due.hourly {
                        debug!(next = %resets.next_hour(), "resetting hourly error counters");
                        self.counters.reset_hourly();
                    }
                    if due.daily {
                        debug!(next = %resets.next_midnight(), "resetting daily error counters");
                        self.counters.reset_daily();
                    }
                }
                _ = evaluate.tick() => {
                    for breach in self.counters.evaluate(&self.config.categories) {
                        warn!(%breach, "error threshold breached");
                        self.dispatcher.fire(Condition::ThresholdBreach(breach)).await;
                    }
                }
            }
        }

        info!("threshold monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn limits(category: &str, hourly: Option<u32>, daily: Option<u32>) -> BTreeMap<String, CategoryLimits> {
        let mut map = BTreeMap::new();
        map.insert(
            category.to_string(),
            CategoryLimits {
                hourly_limit: hourly,
                daily_limit: daily,
            },
        );
        map
    }

    #[test]
    fn increments_feed_both_windows() {
        let mut counters = ErrorCounters::new();
        counters.increment("build", 2);
        counters.increment("build", 1);
        let c = counters.get("build").unwrap();
        assert_eq!((c.hourly, c.daily), (3, 3));
    }

    #[test]
    fn breach_fires_once_per_period() {
        let mut counters = ErrorCounters::new();
        let limits = limits("build", Some(2), None);
        counters.increment("build", 3);

        assert_eq!(counters.evaluate(&limits).len(), 1);
        counters.increment("build", 5);
        assert!(counters.evaluate(&limits).is_empty());
        assert!(counters.evaluate(&limits).is_empty());
    }

    #[test]
    fn count_equal_to_limit_is_not_a_breach() {
        let mut counters = ErrorCounters::new();
        counters.increment("lint", 5);
        assert!(counters.evaluate(&limits("lint", Some(5), Some(5))).is_empty());
    }

    #[test]
    fn hourly_reset_keeps_daily_counts_and_flags() {
        let mut counters = ErrorCounters::new();
        let limits = limits("build", Some(1), Some(1));
        counters.increment("build", 2);
        assert_eq!(counters.evaluate(&limits).len(), 2);

        counters.reset_hourly();
        let c = counters.get("build").unwrap();
        assert_eq!(c.hourly, 0);
        assert_eq!(c.daily, 2);
        assert!(!c.hourly_notified());
        assert!(c.daily_notified());
    }

    fn at(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn reset_boundaries_are_computed_from_wall_clock() {
        let clock = ResetClock::starting_at(at(14, 10, 59, 30));
        assert_eq!(clock.next_hour(), at(14, 11, 0, 0));
        assert_eq!(clock.next_midnight(), at(15, 0, 0, 0));
        assert_eq!(clock.until_next(at(14, 10, 59, 30)), Duration::from_secs(30));

        let on_the_hour = ResetClock::starting_at(at(14, 10, 0, 0));
        assert_eq!(on_the_hour.until_next(at(14, 10, 0, 0)), Duration::from_secs(3_600));
        assert_eq!(ResetClock::starting_at(at(14, 23, 0, 0)).next_hour(), at(15, 0, 0, 0));
    }

    #[test]
    fn late_wake_up_resets_once_and_stays_on_the_hour() {
        let mut clock = ResetClock::starting_at(at(14, 10, 30, 0));
        assert_eq!(clock.due(at(14, 10, 59, 59)), ResetsDue::default());

        // Woken 20 minutes late, e.g. behind a long-running dispatch.
        let due = clock.due(at(14, 11, 20, 0));
        assert!(due.hourly);
        assert!(!due.daily);
        assert_eq!(clock.next_hour(), at(14, 12, 0, 0));
        assert_eq!(clock.until_next(at(14, 11, 20, 0)), Duration::from_secs(40 * 60));

        assert_eq!(clock.due(at(14, 11, 40, 0)), ResetsDue::default());
        assert!(clock.due(at(14, 12, 0, 0)).hourly);
    }

    #[test]
    fn midnight_fires_both_resets() {
        let mut clock = ResetClock::starting_at(at(14, 23, 15, 0));
        let due = clock.due(at(15, 0, 3, 0));
        assert_eq!(due, ResetsDue { hourly: true, daily: true });
        assert_eq!(clock.next_hour(), at(15, 1, 0, 0));
        assert_eq!(clock.next_midnight(), at(16, 0, 0, 0));
    }
}
