//! Step operations: the ways a step can drive external work

use tracing::{info, warn};

use super::step::{OperationCategory, StepOperation};
use crate::contention::{ContentionProbe, LockResolver, LockSettings};
use crate::context::RunContext;
use crate::error::{DeployError, Result};
use crate::health::{HealthPoller, ReadinessCheck, WaitOutcome, WaitSpec};
use crate::progress::MessageLevel;
use crate::retry::{ResilientExecutor, RetryPolicy};
use crate::runner::{CommandSpec, OperationResult};

/// Turn an exhausted retry into an error, or a warning when the call is not fatal
fn settle(
    ctx: &mut RunContext,
    command: &CommandSpec,
    result: &OperationResult,
    fatal: bool,
) -> Result<()> {
    if result.success {
        return Ok(());
    }
    if !fatal {
        warn!(%command, summary = %result.failure_summary(), "non-fatal command failed");
        ctx.say(
            MessageLevel::Warning,
            &format!(
                "`{command}` failed ({}); continuing",
                result.failure_summary()
            ),
        );
        return Ok(());
    }
    Err(DeployError::CommandFailed {
        command: command.to_string(),
        exit_code: result.exit_code,
        stderr: result.failure_summary(),
    })
}

/// A command run through the resilient executor
pub struct ResilientCall {
    command: CommandSpec,
    policy: RetryPolicy,
    fatal: bool,
    diagnostics: Option<CommandSpec>,
}

impl ResilientCall {
    pub fn new(command: CommandSpec, policy: RetryPolicy) -> Self {
        Self {
            command,
            policy,
            fatal: true,
            diagnostics: None,
        }
    }

    /// Failure only warns
    #[must_use]
    pub fn non_fatal(mut self) -> Self {
        self.fatal = false;
        self
    }

    #[must_use]
    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: CommandSpec) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

impl StepOperation for ResilientCall {
    fn category(&self) -> OperationCategory {
        OperationCategory::Resilient
    }

    fn describe(&self) -> String {
        describe_call(&self.command, &self.policy, self.fatal)
    }

    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        let result = ResilientExecutor::execute(ctx, &self.command, &self.policy);
        settle(ctx, &self.command, &result, self.fatal)
    }

    fn diagnostics(&self) -> Option<&CommandSpec> {
        self.diagnostics.as_ref()
    }
}

fn describe_call(command: &CommandSpec, policy: &RetryPolicy, fatal: bool) -> String {
    let mut text = format!("`{command}`");
    if policy.max_attempts > 1 {
        text.push_str(&format!(
            ", {} attempts {}s apart",
            policy.max_attempts,
            policy.delay.as_secs()
        ));
    }
    if !fatal {
        text.push_str(", non-fatal");
    }
    text
}

/// A command that first waits for a contended resource to be free, on every attempt
pub struct LockGuardedCall {
    command: CommandSpec,
    policy: RetryPolicy,
    fatal: bool,
    probe: Box<dyn ContentionProbe>,
    settings: LockSettings,
    diagnostics: Option<CommandSpec>,
}

impl LockGuardedCall {
    pub fn new(
        command: CommandSpec,
        policy: RetryPolicy,
        probe: Box<dyn ContentionProbe>,
        settings: LockSettings,
    ) -> Self {
        Self {
            command,
            policy,
            fatal: true,
            probe,
            settings,
            diagnostics: None,
        }
    }

    #[must_use]
    pub fn non_fatal(mut self) -> Self {
        self.fatal = false;
        self
    }

    #[must_use]
    pub fn fatal(mut self, fatal: bool) -> Self {
        self.fatal = fatal;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: CommandSpec) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

impl StepOperation for LockGuardedCall {
    fn category(&self) -> OperationCategory {
        OperationCategory::LockGuarded
    }

    fn describe(&self) -> String {
        format!(
            "{} once the {} is free",
            describe_call(&self.command, &self.policy, self.fatal),
            self.probe.resource()
        )
    }

    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        let command = &self.command;
        let probe = &mut self.probe;
        let settings = &self.settings;
        let result = ResilientExecutor::try_execute_with(
            ctx,
            &command.to_string(),
            &self.policy,
            |ctx| {
                LockResolver::resolve(ctx, probe.as_mut(), settings)?;
                Ok(ctx.run(command))
            },
        )?;
        settle(ctx, command, &result, self.fatal)
    }

    fn diagnostics(&self) -> Option<&CommandSpec> {
        self.diagnostics.as_ref()
    }
}

/// Wait for a readiness check through the health poller
pub struct HealthPolledWait {
    check: Box<dyn ReadinessCheck>,
    wait: WaitSpec,
}

impl HealthPolledWait {
    pub fn new(check: Box<dyn ReadinessCheck>, wait: WaitSpec) -> Self {
        Self { check, wait }
    }
}

impl StepOperation for HealthPolledWait {
    fn category(&self) -> OperationCategory {
        OperationCategory::HealthPolled
    }

    fn describe(&self) -> String {
        format!(
            "wait up to {}s for {}",
            self.wait.timeout.as_secs(),
            self.check.describe()
        )
    }

    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        let runner = ctx.runner();
        let check = &self.check;
        let mut predicate = || check.is_ready(runner.as_ref());
        match HealthPoller::wait_until(ctx, &mut predicate, &self.wait)? {
            WaitOutcome::Ready => Ok(()),
            WaitOutcome::TimedOut => Err(DeployError::HealthTimeout {
                subject: self.wait.subject.clone(),
                waited_secs: self.wait.timeout.as_secs(),
            }),
            WaitOutcome::Cancelled => Err(DeployError::Cancelled {
                step: self.wait.subject.clone(),
            }),
        }
    }

    fn diagnostics(&self) -> Option<&CommandSpec> {
        self.wait.diagnostics.as_ref()
    }
}

/// Named sub-operations run in order; the first failure stops the rest
pub struct Composite {
    parts: Vec<(String, Box<dyn StepOperation>)>,
    diagnostics: Option<CommandSpec>,
}

impl Composite {
    pub fn new() -> Self {
        Self {
            parts: Vec::new(),
            diagnostics: None,
        }
    }

    #[must_use]
    pub fn then(mut self, name: impl Into<String>, operation: impl StepOperation + 'static) -> Self {
        self.parts.push((name.into(), Box::new(operation)));
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: CommandSpec) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

impl Default for Composite {
    fn default() -> Self {
        Self::new()
    }
}

impl StepOperation for Composite {
    fn category(&self) -> OperationCategory {
        OperationCategory::Composite
    }

    fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        for (name, operation) in &mut self.parts {
            info!(part = %name, "running");
            ctx.say(MessageLevel::Detail, name);
            operation.run(ctx)?;
        }
        Ok(())
    }

    fn diagnostics(&self) -> Option<&CommandSpec> {
        self.diagnostics
            .as_ref()
            .or_else(|| self.parts.iter().find_map(|(_, op)| op.diagnostics()))
    }
}

type TaskFn = Box<dyn FnMut(&mut RunContext) -> Result<()>>;

/// An arbitrary piece of work over the run context
pub struct Task {
    description: String,
    work: TaskFn,
}

impl Task {
    pub fn new(
        description: impl Into<String>,
        work: impl FnMut(&mut RunContext) -> Result<()> + 'static,
    ) -> Self {
        Self {
            description: description.into(),
            work: Box::new(work),
        }
    }
}

impl StepOperation for Task {
    fn category(&self) -> OperationCategory {
        OperationCategory::Task
    }

    fn describe(&self) -> String {
        self.description.clone()
    }

    fn run(&mut self, ctx: &mut RunContext) -> Result<()> {
        (self.work)(ctx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::contention::{ContentionSnapshot, InterventionMode};
    use crate::health::CommandSucceeds;
    use crate::operator::MenuChoice;
    use crate::test_support::{Harness, ScriptedOperator, ScriptedProbe};

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_secs(5))
    }

    #[test]
    fn test_non_fatal_call_only_warns() {
        let harness = Harness::new();
        harness.runner.always_fail("apt-get update");
        let mut ctx = harness.context();
        let mut call = ResilientCall::new(CommandSpec::new("apt-get").arg("update"), policy()).non_fatal();

        call.run(&mut ctx).unwrap();

        assert_eq!(harness.runner.count("apt-get update"), 3);
        assert!(
            harness
                .progress
                .events()
                .iter()
                .any(|e| e.contains("continuing"))
        );
    }

    #[test]
    fn test_fatal_call_reports_command() {
        let harness = Harness::new();
        harness.runner.always_fail("curl");
        let mut ctx = harness.context();
        let mut call = ResilientCall::new(CommandSpec::new("curl").arg("-fsSL"), policy());

        let err = call.run(&mut ctx).unwrap_err();

        match err {
            DeployError::CommandFailed { command, exit_code, .. } => {
                assert_eq!(command, "curl -fsSL");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_lock_guarded_resolves_before_each_attempt() {
        let harness = Harness::new();
        harness.runner.respond(
            "apt-get install",
            vec![
                OperationResult::failed(100, "E: Could not get lock"),
                OperationResult::succeeded("done"),
            ],
        );
        let mut ctx = harness.context();
        let probe = ScriptedProbe::free();
        let mut call = LockGuardedCall::new(
            CommandSpec::new("apt-get").args(["install", "-y", "curl"]),
            policy(),
            Box::new(probe.clone()),
            LockSettings::default(),
        );

        call.run(&mut ctx).unwrap();

        assert_eq!(probe.polls(), 2);
        assert_eq!(harness.runner.count("apt-get install"), 2);
    }

    #[test]
    fn test_lock_guarded_abort_propagates() {
        let operator = ScriptedOperator::new()
            .with_contention(&[crate::operator::ContentionChoice::Abort])
            .with_confirmations(&[true]);
        let harness = Harness::with_operator(operator);
        let mut ctx = harness.context();
        let busy = ContentionSnapshot {
            processes: ["apt".to_string()].into(),
            ..ContentionSnapshot::default()
        };
        let probe = ScriptedProbe::new(vec![busy]);
        let mut call = LockGuardedCall::new(
            CommandSpec::new("apt-get").arg("update"),
            policy(),
            Box::new(probe.clone()),
            LockSettings {
                stagnation_threshold: 2,
                ..LockSettings::default()
            },
        );

        let err = call.run(&mut ctx).unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(probe.interventions(), vec![InterventionMode::Automatic]);
        assert_eq!(harness.runner.count("apt-get"), 0);
    }

    #[test]
    fn test_health_wait_timeout_is_error() {
        let harness = Harness::new();
        harness.runner.always_fail("systemctl is-active");
        let mut ctx = harness.context();
        let mut wait = HealthPolledWait::new(
            Box::new(CommandSucceeds(
                CommandSpec::new("systemctl").args(["is-active", "docker"]),
            )),
            WaitSpec::new("Docker daemon", Duration::from_secs(20), Duration::from_secs(5)),
        );

        let err = wait.run(&mut ctx).unwrap_err();

        assert!(matches!(err, DeployError::HealthTimeout { waited_secs: 20, .. }));
    }

    #[test]
    fn test_health_wait_cancel_is_cancelled() {
        let operator = ScriptedOperator::new()
            .with_recovery(&[MenuChoice::Cancel])
            .with_confirmations(&[true]);
        let harness = Harness::with_operator(operator);
        harness.runner.always_fail("curl");
        let mut ctx = harness.context();
        let mut wait = HealthPolledWait::new(
            Box::new(CommandSucceeds(CommandSpec::new("curl"))),
            WaitSpec::new("service health", Duration::from_secs(20), Duration::from_secs(5)),
        );

        assert!(wait.run(&mut ctx).unwrap_err().is_cancelled());
    }

    #[test]
    fn test_composite_stops_at_first_failure() {
        let harness = Harness::new();
        harness.runner.always_fail("false");
        let mut ctx = harness.context();
        let mut composite = Composite::new()
            .then("first", ResilientCall::new(CommandSpec::new("true"), RetryPolicy::once()))
            .then("second", ResilientCall::new(CommandSpec::new("false"), RetryPolicy::once()))
            .then("third", ResilientCall::new(CommandSpec::new("echo"), RetryPolicy::once()));

        assert!(composite.run(&mut ctx).is_err());
        assert_eq!(harness.runner.count("echo"), 0);
        assert_eq!(composite.describe(), "first; second; third");
    }
}
