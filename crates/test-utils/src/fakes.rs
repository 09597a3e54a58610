//! Scripted stand-ins for the daemon's IO seams.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use autopilot::exec::{BoxFuture, CommandOutput, CommandRequest, CommandRunner, CommandStatus, Notifier};
use autopilot::monitor::ChangeSource;
use autopilot::types::Urgency;

/// A fake runner that:
/// - pops a scripted status per command, then falls back to a sticky
///   per-command status (default `Success`)
/// - records every request it saw
/// - optionally holds a command "running" for a while, tracking how many
///   invocations overlap
#[derive(Default)]
pub struct FakeCommandRunner {
    scripts: Mutex<HashMap<String, VecDeque<CommandStatus>>>,
    fallback: Mutex<HashMap<String, CommandStatus>>,
    calls: Mutex<Vec<CommandRequest>>,
    holds: Mutex<HashMap<String, Duration>>,
    in_flight: Mutex<InFlight>,
}

#[derive(Default)]
struct InFlight {
    per_command: HashMap<String, usize>,
    peak_per_command: HashMap<String, usize>,
    total: usize,
    peak_total: usize,
}

impl FakeCommandRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue statuses for the next invocations of `command`.
    pub fn script(&self, command: &str, statuses: impl IntoIterator<Item = CommandStatus>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(command.to_string())
            .or_default()
            .extend(statuses);
    }

    /// Status returned once the script for `command` is used up.
    pub fn always(&self, command: &str, status: CommandStatus) {
        self.fallback
            .lock()
            .unwrap()
            .insert(command.to_string(), status);
    }

    /// Keep every invocation of `command` running for `duration`.
    pub fn hold(&self, command: &str, duration: Duration) {
        self.holds
            .lock()
            .unwrap()
            .insert(command.to_string(), duration);
    }

    /// Most invocations of `command` that were running at the same time.
    pub fn peak_concurrency(&self, command: &str) -> usize {
        self.in_flight
            .lock()
            .unwrap()
            .peak_per_command
            .get(command)
            .copied()
            .unwrap_or(0)
    }

    /// Most invocations of any command running at the same time.
    pub fn peak_total_concurrency(&self) -> usize {
        self.in_flight.lock().unwrap().peak_total
    }

    fn enter(&self, command: &str) {
        let mut state = self.in_flight.lock().unwrap();
        let running = state.per_command.entry(command.to_string()).or_default();
        *running += 1;
        let running = *running;
        let peak = state.peak_per_command.entry(command.to_string()).or_default();
        *peak = (*peak).max(running);
        state.total += 1;
        state.peak_total = state.peak_total.max(state.total);
    }

    fn leave(&self, command: &str) {
        let mut state = self.in_flight.lock().unwrap();
        if let Some(running) = state.per_command.get_mut(command) {
            *running -= 1;
        }
        state.total -= 1;
    }

    pub fn calls(&self) -> Vec<CommandRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, command: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.command == command)
            .count()
    }

    /// Commands in invocation order.
    pub fn commands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.command.clone())
            .collect()
    }
}

impl CommandRunner for FakeCommandRunner {
    fn run(&self, request: CommandRequest) -> BoxFuture<'_, anyhow::Result<CommandOutput>> {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.command)
            .and_then(|q| q.pop_front());
        let status = scripted.unwrap_or_else(|| {
            self.fallback
                .lock()
                .unwrap()
                .get(&request.command)
                .copied()
                .unwrap_or(CommandStatus::Success)
        });
        let hold = self.holds.lock().unwrap().get(&request.command).copied();
        let command = request.command.clone();
        self.calls.lock().unwrap().push(request);

        Box::pin(async move {
            self.enter(&command);
            if let Some(hold) = hold {
                tokio::time::sleep(hold).await;
            }
            self.leave(&command);
            Ok(CommandOutput {
                status,
                stdout: String::new(),
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub channel: String,
    pub message: String,
    pub urgency: Urgency,
}

/// Notifier that records what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
    failing: bool,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A notifier that rejects every message (but still records it).
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        })
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send<'a>(
        &'a self,
        channel: &'a str,
        message: &'a str,
        urgency: Urgency,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        self.sent.lock().unwrap().push(SentNotification {
            channel: channel.to_string(),
            message: message.to_string(),
            urgency,
        });
        let failing = self.failing;
        Box::pin(async move {
            if failing {
                Err(anyhow!("channel {channel} rejected the message"))
            } else {
                Ok(())
            }
        })
    }
}

/// Change source answering from scripted queues. The last answer sticks once
/// a queue runs dry.
#[derive(Default)]
pub struct FakeChangeSource {
    changed: Mutex<VecDeque<Vec<String>>>,
    last_changed: Mutex<Vec<String>>,
    heads: Mutex<VecDeque<String>>,
    last_head: Mutex<Option<String>>,
}

impl FakeChangeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_changed<S: AsRef<str>>(&self, files: &[S]) {
        self.changed
            .lock()
            .unwrap()
            .push_back(files.iter().map(|f| f.as_ref().to_string()).collect());
    }

    pub fn push_head(&self, revision: &str) {
        self.heads.lock().unwrap().push_back(revision.to_string());
    }
}

impl ChangeSource for FakeChangeSource {
    fn changed_files(&self) -> BoxFuture<'_, anyhow::Result<Vec<String>>> {
        let next = self.changed.lock().unwrap().pop_front();
        let files = match next {
            Some(files) => {
                *self.last_changed.lock().unwrap() = files.clone();
                files
            }
            None => self.last_changed.lock().unwrap().clone(),
        };
        Box::pin(async move { Ok(files) })
    }

    fn head_revision(&self) -> BoxFuture<'_, anyhow::Result<String>> {
        let next = self.heads.lock().unwrap().pop_front();
        let head = match next {
            Some(rev) => {
                *self.last_head.lock().unwrap() = Some(rev.clone());
                Some(rev)
            }
            None => self.last_head.lock().unwrap().clone(),
        };
        Box::pin(async move { head.ok_or_else(|| anyhow!("no head revision scripted")) })
    }
}
