// src/monitor/vcs.rs

//! Version-control queries used by the polling detectors.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::exec::runner::{CommandRequest, CommandRunner, CommandStatus};
use crate::exec::BoxFuture;

/// Default timeout for a single VCS query.
pub const DEFAULT_VCS_TIMEOUT: Duration = Duration::from_secs(30);

static SAFE_REVISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/@{}^~-]*$").expect("revision pattern is a valid regex")
});

/// Whether `rev` can be interpolated into a shell command line verbatim.
pub fn is_safe_revision(rev: &str) -> bool {
    SAFE_REVISION.is_match(rev) && !rev.contains("..")
}

/// Where detectors learn about repository state.
///
/// The production implementation shells out to git; tests script the
/// answers.
pub trait ChangeSource: Send + Sync {
    /// Paths changed relative to the configured baseline.
    fn changed_files(&self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Identifier of the current head revision.
    fn head_revision(&self) -> BoxFuture<'_, Result<String>>;
}

pub struct GitChangeSource {
    runner: Arc<dyn CommandRunner>,
    baseline: String,
    timeout: Duration,
}

impl std::fmt::Debug for GitChangeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitChangeSource")
            .field("baseline", &self.baseline)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl GitChangeSource {
    pub fn new(runner: Arc<dyn CommandRunner>, baseline: impl Into<String>) -> Self {
        Self {
            runner,
            baseline: baseline.into(),
            timeout: DEFAULT_VCS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn git(&self, args: &str) -> Result<String> {
        let command = format!("git {args}");
        let output = self
            .runner
            .run(CommandRequest::new(command.as_str(), self.timeout))
            .await
            .with_context(|| format!("running `{command}`"))?;

        match output.status {
            CommandStatus::Success => Ok(output.stdout),
            CommandStatus::Failed(code) => bail!("`{command}` exited with code {code}"),
            CommandStatus::TimedOut => bail!("`{command}` timed out after {:?}", self.timeout),
        }
    }
}

impl ChangeSource for GitChangeSource {
    fn changed_files(&self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async move {
            if !is_safe_revision(&self.baseline) {
                bail!("refusing to diff against unsafe baseline '{}'", self.baseline);
            }
            let stdout = self.git(&format!("diff --name-only {}", self.baseline)).await?;
            Ok(parse_name_list(&stdout))
        })
    }

    fn head_revision(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let stdout = self.git("rev-parse HEAD").await?;
            let rev = stdout.trim();
            if rev.is_empty() {
                bail!("`git rev-parse HEAD` printed nothing");
            }
            Ok(rev.to_string())
        })
    }
}

/// One path per non-empty line, deduplicated, order preserved.
fn parse_name_list(stdout: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter(|l| seen.insert(*l))
        .map(str::to_string)
        .collect()
}
