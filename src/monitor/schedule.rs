// src/monitor/schedule.rs

//! TaskScheduler: calendar-like rules checked on a fixed tick.
//!
//! Supported cadences:
//! - `every <N>h`            at the top of every hour divisible by N (1..=24)
//! - `daily HH:MM`           once per day at HH:MM
//! - `weekly <day> HH:MM`    once per week, on one weekday (`mon`..`sun`)
//!
//! Each occurrence is keyed by its scheduled datetime. A rule fires on the
//! first tick at or after that instant, and at most once per occurrence,
//! whatever the tick interval.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveDateTime, NaiveTime, TimeDelta, Timelike, Weekday};
use regex::Regex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ScheduledTaskTrigger;
use crate::engine::{Condition, Dispatcher};
use crate::shutdown::ShutdownToken;

/// Catch-up window when none is configured; matches the default tick.
const DEFAULT_CATCH_UP_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    EveryHours(u32),
    Daily { hour: u32, minute: u32 },
    Weekly { day: Weekday, hour: u32, minute: u32 },
}

static CADENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:every\s+(?P<n>\d+)\s*h|daily\s+(?P<dh>\d{1,2}):(?P<dm>\d{2})|weekly\s+(?P<day>[a-z]+)\s+(?P<wh>\d{1,2}):(?P<wm>\d{2}))$",
    )
    .expect("cadence pattern is a valid regex")
});

fn parse_clock(hour: &str, minute: &str) -> Result<(u32, u32), String> {
    let hour: u32 = hour.parse().map_err(|e| format!("invalid hour '{hour}': {e}"))?;
    let minute: u32 = minute
        .parse()
        .map_err(|e| format!("invalid minute '{minute}': {e}"))?;
    if hour > 23 || minute > 59 {
        return Err(format!("time {hour:02}:{minute:02} is out of range"));
    }
    Ok((hour, minute))
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let caps = CADENCE.captures(&normalized).ok_or_else(|| {
            format!("unrecognized schedule '{s}' (expected 'every <N>h', 'daily HH:MM' or 'weekly <day> HH:MM')")
        })?;

        if let Some(n) = caps.name("n") {
            let hours: u32 = n
                .as_str()
                .parse()
                .map_err(|e| format!("invalid hour interval in '{s}': {e}"))?;
            if !(1..=24).contains(&hours) {
                return Err(format!("hour interval in '{s}' must be between 1 and 24"));
            }
            return Ok(Cadence::EveryHours(hours));
        }

        if let (Some(h), Some(m)) = (caps.name("dh"), caps.name("dm")) {
            let (hour, minute) = parse_clock(h.as_str(), m.as_str())?;
            return Ok(Cadence::Daily { hour, minute });
        }

        match (caps.name("day"), caps.name("wh"), caps.name("wm")) {
            (Some(day), Some(h), Some(m)) => {
                let day: Weekday = day
                    .as_str()
                    .parse()
                    .map_err(|_| format!("unknown weekday '{}' in '{s}'", day.as_str()))?;
                let (hour, minute) = parse_clock(h.as_str(), m.as_str())?;
                Ok(Cadence::Weekly { day, hour, minute })
            }
            _ => Err(format!("unrecognized schedule '{s}'")),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::EveryHours(n) => write!(f, "every {n}h"),
            Cadence::Daily { hour, minute } => write!(f, "daily {hour:02}:{minute:02}"),
            Cadence::Weekly { day, hour, minute } => {
                write!(f, "weekly {} {hour:02}:{minute:02}", day.to_string().to_lowercase())
            }
        }
    }
}

impl Cadence {
    /// The latest scheduled instant at or before `now`. `None` only for a
    /// hand-built cadence whose clock time is out of range.
    pub fn last_occurrence(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        let midnight = now.date().and_time(NaiveTime::MIN);
        match *self {
            Cadence::EveryHours(n) => {
                if n == 0 {
                    return None;
                }
                let hour = now.hour() - now.hour() % n;
                Some(midnight + TimeDelta::hours(i64::from(hour)))
            }
            Cadence::Daily { hour, minute } => {
                let today = now.date().and_time(NaiveTime::from_hms_opt(hour, minute, 0)?);
                Some(if today <= now {
                    today
                } else {
                    today - TimeDelta::days(1)
                })
            }
            Cadence::Weekly { day, hour, minute } => {
                let days_back = (now.weekday().num_days_from_monday() + 7
                    - day.num_days_from_monday())
                    % 7;
                let candidate = (now.date() - TimeDelta::days(i64::from(days_back)))
                    .and_time(NaiveTime::from_hms_opt(hour, minute, 0)?);
                Some(if candidate <= now {
                    candidate
                } else {
                    candidate - TimeDelta::weeks(1)
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ScheduledRule {
    cadence: Cadence,
    actions: Vec<String>,
    last_fired: Option<NaiveDateTime>,
}

/// A rule that matched and has not fired for this occurrence yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueTask {
    pub name: String,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TaskScheduler {
    rules: BTreeMap<String, ScheduledRule>,
    /// Time of the previous evaluation.
    last_tick: Option<NaiveDateTime>,
    /// How far back the first evaluation looks for a missed occurrence.
    catch_up: TimeDelta,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            last_tick: None,
            catch_up: TimeDelta::seconds(DEFAULT_CATCH_UP_SECS),
        }
    }
}

impl TaskScheduler {
    /// Build from config. Schedules were already checked during validation;
    /// anything unparsable here is skipped.
    pub fn from_config(config: &ScheduledTaskTrigger) -> Self {
        let mut scheduler = Self::default().with_catch_up(config.tick_interval());
        for (name, task) in &config.tasks {
            match task.schedule.parse::<Cadence>() {
                Ok(cadence) => scheduler.insert(name, cadence, task.actions.clone()),
                Err(e) => tracing::warn!(task = %name, error = %e, "skipping scheduled task"),
            }
        }
        scheduler
    }

    pub fn with_catch_up(mut self, window: Duration) -> Self {
        self.catch_up = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, cadence: Cadence, actions: Vec<String>) {
        self.rules.insert(
            name.into(),
            ScheduledRule {
                cadence,
                actions,
                last_fired: None,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rules with an occurrence since the previous evaluation; marks each
    /// returned rule as fired for that occurrence.
    ///
    /// Ticks therefore never need to land inside the scheduled minute or
    /// hour: a late tick still picks the occurrence up, once. On the first
    /// evaluation (or after the clock moved backwards) only occurrences
    /// within the catch-up window count.
    pub fn evaluate(&mut self, now: NaiveDateTime) -> Vec<DueTask> {
        let previous = self.last_tick.filter(|prev| *prev <= now);
        self.last_tick = Some(now);

        let mut due = Vec::new();
        for (name, rule) in self.rules.iter_mut() {
            let Some(scheduled) = rule.cadence.last_occurrence(now) else {
                continue;
            };
            let fresh = match previous {
                Some(prev) => scheduled > prev,
                None => now - scheduled <= self.catch_up,
            };
            if !fresh || rule.last_fired.is_some_and(|fired| fired >= scheduled) {
                continue;
            }
            rule.last_fired = Some(scheduled);
            due.push(DueTask {
                name: name.clone(),
                actions: rule.actions.clone(),
            });
        }
        due
    }

    pub async fn run(
        mut self,
        config: ScheduledTaskTrigger,
        dispatcher: Dispatcher,
        mut shutdown: ShutdownToken,
    ) {
        let mut ticker = interval(config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(tasks = self.len(), tick_secs = config.tick_secs, "task scheduler started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let now = Local::now().naive_local();
                    for task in self.evaluate(now) {
                        debug!(task = %task.name, "scheduled task due");
                        dispatcher
                            .fire(Condition::ScheduledTask {
                                task: task.name,
                                actions: task.actions,
                            })
                            .await;
                    }
                }
            }
        }

        info!("task scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        // 2026-06-01 is a Monday.
        NaiveDate::from_ymd_opt(2026, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn parses_supported_grammar() {
        assert_eq!("every 6h".parse::<Cadence>(), Ok(Cadence::EveryHours(6)));
        assert_eq!(
            "daily 02:30".parse::<Cadence>(),
            Ok(Cadence::Daily { hour: 2, minute: 30 })
        );
        assert_eq!(
            "Weekly MON 09:00".parse::<Cadence>(),
            Ok(Cadence::Weekly {
                day: Weekday::Mon,
                hour: 9,
                minute: 0
            })
        );
    }

    #[test]
    fn rejects_bad_schedules() {
        for bad in ["every 0h", "every 25h", "daily 24:00", "weekly funday 09:00", "0 * * * *", ""] {
            assert!(bad.parse::<Cadence>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn display_round_trips() {
        let cadence: Cadence = "weekly fri 17:05".parse().unwrap();
        assert_eq!(cadence.to_string(), "weekly fri 17:05");
    }

    #[test]
    fn hourly_rule_fires_once_per_matching_hour() {
        let mut scheduler = TaskScheduler::default();
        scheduler.insert("sweep", Cadence::EveryHours(6), vec!["typecheck".into()]);

        assert_eq!(scheduler.evaluate(at(1, 6, 0)).len(), 1);
        assert!(scheduler.evaluate(at(1, 6, 55)).is_empty());
        assert!(scheduler.evaluate(at(1, 7, 0)).is_empty());
        assert_eq!(scheduler.evaluate(at(1, 12, 5)).len(), 1);
    }

    #[test]
    fn weekly_rule_waits_for_its_minute_and_day() {
        let mut scheduler = TaskScheduler::default();
        scheduler.insert("audit", "weekly mon 09:30".parse().unwrap(), vec!["audit".into()]);

        assert!(scheduler.evaluate(at(1, 9, 10)).is_empty());
        assert_eq!(scheduler.evaluate(at(1, 9, 30)).len(), 1);
        assert!(scheduler.evaluate(at(2, 9, 30)).is_empty());
        assert_eq!(scheduler.evaluate(at(8, 9, 45)).len(), 1);
    }

    #[test]
    fn last_occurrence_looks_back_to_the_scheduled_instant() {
        let weekly: Cadence = "weekly mon 09:30".parse().unwrap();
        assert_eq!(weekly.last_occurrence(at(1, 9, 30)), Some(at(1, 9, 30)));
        assert_eq!(weekly.last_occurrence(at(3, 14, 0)), Some(at(1, 9, 30)));
        assert_eq!(weekly.last_occurrence(at(8, 9, 29)), Some(at(1, 9, 30)));

        let daily: Cadence = "daily 09:58".parse().unwrap();
        assert_eq!(daily.last_occurrence(at(2, 10, 0)), Some(at(2, 9, 58)));
        assert_eq!(daily.last_occurrence(at(2, 9, 57)), Some(at(1, 9, 58)));

        assert_eq!(Cadence::EveryHours(6).last_occurrence(at(2, 17, 45)), Some(at(2, 12, 0)));
        assert_eq!(Cadence::Daily { hour: 25, minute: 0 }.last_occurrence(at(2, 0, 0)), None);
    }

    #[test]
    fn tick_landing_after_the_scheduled_minute_still_fires() {
        let mut scheduler = TaskScheduler::default();
        scheduler.insert("report", "daily 09:58".parse().unwrap(), vec!["report".into()]);

        assert!(scheduler.evaluate(at(2, 9, 55)).is_empty());
        assert_eq!(scheduler.evaluate(at(2, 10, 0)).len(), 1);
        assert!(scheduler.evaluate(at(2, 10, 5)).is_empty());
    }

    #[test]
    fn first_evaluation_ignores_occurrences_outside_the_catch_up_window() {
        let mut scheduler = TaskScheduler::default().with_catch_up(Duration::from_secs(600));
        scheduler.insert("backup", "daily 02:30".parse().unwrap(), vec!["backup".into()]);
        assert!(scheduler.evaluate(at(2, 15, 0)).is_empty());

        let mut scheduler = TaskScheduler::default().with_catch_up(Duration::from_secs(600));
        scheduler.insert("backup", "daily 02:30".parse().unwrap(), vec!["backup".into()]);
        assert_eq!(scheduler.evaluate(at(2, 2, 35)).len(), 1);
    }

    #[test]
    fn clock_moving_backwards_does_not_refire() {
        let mut scheduler = TaskScheduler::default();
        scheduler.insert("backup", "daily 02:30".parse().unwrap(), vec!["backup".into()]);

        assert_eq!(scheduler.evaluate(at(2, 2, 30)).len(), 1);
        assert!(scheduler.evaluate(at(2, 2, 31)).is_empty());
        assert!(scheduler.evaluate(at(2, 2, 30)).is_empty());
    }
}
