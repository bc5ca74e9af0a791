//! YAML plan files for `homestead run`
//!
//! ```yaml
//! name: refresh certificates
//! steps:
//!   - label: Install certbot
//!     kind: lock_guarded
//!     command: [apt-get, install, -y, certbot]
//!   - label: Wait for the homeserver
//!     kind: health_polled
//!     url: http://localhost:8000/_matrix/client/versions
//!     timeout: 5m
//! ```
//!
//! Unset retry, lock and health values fall back to the configured [`Timing`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use super::ops::{HealthPolledWait, LockGuardedCall, ResilientCall};
use super::step::StepOperation;
use crate::config::{BackoffKind, Timing};
use crate::contention::{LockSettings, PackageLockProbe};
use crate::error::{DeployError, Result};
use crate::health::{CommandSucceeds, HttpOk, ReadinessCheck, WaitSpec};
use crate::retry::{FailureCheck, RetryPolicy};
use crate::runner::CommandSpec;

/// A command written either as an argument list or as one whitespace-separated line
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Argv {
    List(Vec<String>),
    Line(String),
}

impl Argv {
    fn words(&self) -> Vec<String> {
        match self {
            Argv::List(words) => words.clone(),
            Argv::Line(line) => line.split_whitespace().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Resilient,
    LockGuarded,
    HealthPolled,
}

/// Per-step retry overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepRetry {
    pub attempts: Option<usize>,
    #[serde(with = "humantime_serde")]
    pub delay: Option<Duration>,
    pub backoff: Option<BackoffKind>,
    #[serde(with = "humantime_serde")]
    pub max_delay: Option<Duration>,
    /// Any stderr output counts as a failed attempt
    pub fail_on_stderr: bool,
    /// Stdout containing this text counts as a failed attempt
    pub fail_on_output: Option<String>,
}

/// Per-step lock overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StepLock {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_wait: Option<Duration>,
    pub stagnation_threshold: Option<usize>,
}

fn default_fatal() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StepDefinition {
    pub label: String,
    pub kind: StepKind,
    #[serde(default)]
    pub command: Option<Argv>,
    /// Readiness command for `health_polled` steps
    #[serde(default)]
    pub check: Option<Argv>,
    /// Readiness URL for `health_polled` steps
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub retry: Option<StepRetry>,
    #[serde(default = "default_fatal")]
    pub fatal: bool,
    #[serde(default)]
    pub lock: Option<StepLock>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub poll_interval: Option<Duration>,
    #[serde(default)]
    pub diagnostics: Option<Argv>,
    /// Name shown by the troubleshooting menu; defaults to the label
    #[serde(default)]
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlanFile {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<StepDefinition>,
}

impl PlanFile {
    #[cfg(test)]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(DeployError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }
        let content = fs::read_to_string(path).map_err(|e| DeployError::FileReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| DeployError::ConfigParseFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Build the step operations, checking each definition against its kind
    pub fn into_steps(self, timing: &Timing) -> Result<Vec<(String, Box<dyn StepOperation>)>> {
        if self.steps.is_empty() {
            return Err(invalid("the plan has no steps"));
        }
        self.steps
            .into_iter()
            .enumerate()
            .map(|(index, step)| {
                let label = step.label.trim().to_string();
                if label.is_empty() {
                    return Err(invalid(format!("step {} has no label", index + 1)));
                }
                let operation = step.build(&label, timing)?;
                Ok((label, operation))
            })
            .collect()
    }
}

fn invalid(message: impl Into<String>) -> DeployError {
    DeployError::PlanInvalid {
        message: message.into(),
    }
}

impl StepDefinition {
    fn build(self, label: &str, timing: &Timing) -> Result<Box<dyn StepOperation>> {
        if self.kind != StepKind::LockGuarded && self.lock.is_some() {
            return Err(invalid(format!(
                "step '{label}': `lock` only applies to lock_guarded steps"
            )));
        }
        let diagnostics = self
            .diagnostics
            .as_ref()
            .map(|argv| self.spec(label, "diagnostics", argv))
            .transpose()?;

        match self.kind {
            StepKind::Resilient | StepKind::LockGuarded => {
                if self.check.is_some() || self.url.is_some() {
                    return Err(invalid(format!(
                        "step '{label}': `check` and `url` only apply to health_polled steps"
                    )));
                }
                let argv = self
                    .command
                    .as_ref()
                    .ok_or_else(|| invalid(format!("step '{label}' needs a `command`")))?;
                let command = self.spec(label, "command", argv)?;
                let policy = self.policy(timing);

                let operation: Box<dyn StepOperation> = if self.kind == StepKind::Resilient {
                    let mut call = ResilientCall::new(command, policy).fatal(self.fatal);
                    if let Some(diagnostics) = diagnostics {
                        call = call.with_diagnostics(diagnostics);
                    }
                    Box::new(call)
                } else {
                    let mut call = LockGuardedCall::new(
                        command,
                        policy,
                        Box::new(PackageLockProbe::default()),
                        self.lock_settings(timing),
                    )
                    .fatal(self.fatal);
                    if let Some(diagnostics) = diagnostics {
                        call = call.with_diagnostics(diagnostics);
                    }
                    Box::new(call)
                };
                Ok(operation)
            }
            StepKind::HealthPolled => {
                if self.command.is_some() || self.retry.is_some() {
                    return Err(invalid(format!(
                        "step '{label}': health_polled steps take `check` or `url`, not `command` or `retry`"
                    )));
                }
                let check: Box<dyn ReadinessCheck> = match (&self.check, &self.url) {
                    (Some(argv), None) => {
                        Box::new(CommandSucceeds(self.spec(label, "check", argv)?))
                    }
                    (None, Some(url)) if url.starts_with("http://") || url.starts_with("https://") => {
                        Box::new(HttpOk::new(url.clone()))
                    }
                    (None, Some(url)) => {
                        return Err(invalid(format!(
                            "step '{label}': '{url}' is not an http(s) URL"
                        )));
                    }
                    _ => {
                        return Err(invalid(format!(
                            "step '{label}' needs exactly one of `check` or `url`"
                        )));
                    }
                };
                let timeout = self.timeout.unwrap_or(timing.health.service_timeout);
                let poll_interval = self.poll_interval.unwrap_or(timing.health.poll_interval);
                if timeout.is_zero() || poll_interval.is_zero() {
                    return Err(invalid(format!(
                        "step '{label}': timeout and poll_interval must be greater than zero"
                    )));
                }
                let subject = self.subject.clone().unwrap_or_else(|| label.to_string());
                let mut wait = WaitSpec::new(subject, timeout, poll_interval);
                if let Some(diagnostics) = diagnostics {
                    wait = wait.with_diagnostics(diagnostics);
                }
                Ok(Box::new(HealthPolledWait::new(check, wait)))
            }
        }
    }

    fn spec(&self, label: &str, field: &str, argv: &Argv) -> Result<CommandSpec> {
        let mut spec = CommandSpec::from_argv(argv.words().as_slice())
            .ok_or_else(|| invalid(format!("step '{label}': `{field}` is empty")))?;
        for (key, value) in &self.env {
            spec = spec.env(key.clone(), value.clone());
        }
        if let Some(cwd) = &self.cwd {
            spec = spec.current_dir(cwd.clone());
        }
        Ok(spec)
    }

    fn policy(&self, timing: &Timing) -> RetryPolicy {
        let defaults = &timing.retry;
        let overrides = self.retry.clone().unwrap_or_default();
        let attempts = overrides.attempts.unwrap_or(defaults.attempts);
        let delay = overrides.delay.unwrap_or(defaults.delay);
        let mut policy = match overrides.backoff.unwrap_or(defaults.backoff) {
            BackoffKind::Fixed => RetryPolicy::fixed(attempts, delay),
            BackoffKind::Exponential => RetryPolicy::exponential(
                attempts,
                delay,
                overrides.max_delay.unwrap_or(defaults.max_delay),
            ),
        };
        if overrides.fail_on_stderr {
            policy = policy.with_check(FailureCheck::StderrNotEmpty);
        }
        if let Some(marker) = overrides.fail_on_output {
            policy = policy.with_check(FailureCheck::StdoutContains(marker));
        }
        policy
    }

    fn lock_settings(&self, timing: &Timing) -> LockSettings {
        let defaults = timing.lock.settings();
        let Some(lock) = &self.lock else {
            return defaults;
        };
        LockSettings {
            poll_interval: lock.poll_interval.unwrap_or(defaults.poll_interval),
            max_wait: lock.max_wait.unwrap_or(defaults.max_wait),
            stagnation_threshold: lock
                .stagnation_threshold
                .unwrap_or(defaults.stagnation_threshold),
        }
    }
}
