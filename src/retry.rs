//! Resilient executor: bounded retry with delay around an external operation
//!
//! The executor never turns an exhausted retry budget into an error. It hands back the last
//! attempt's result and the caller decides whether that is fatal, should escalate, or can be
//! ignored.

use std::convert::Infallible;
use std::time::Duration;

use backon::{BackoffBuilder, ConstantBuilder, ExponentialBuilder};
use tracing::{debug, warn};

use crate::context::RunContext;
use crate::error::Result;
use crate::progress::MessageLevel;
use crate::runner::{CommandSpec, OperationResult};

/// Shape of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubling delay starting at the base delay, capped at `max_delay`
    Exponential { max_delay: Duration },
}

/// Which parts of a result count as failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCheck {
    NonZeroExit,
    StderrNotEmpty,
    StdoutContains(String),
}

impl FailureCheck {
    fn fails(&self, result: &OperationResult) -> bool {
        match self {
            FailureCheck::NonZeroExit => !result.success,
            FailureCheck::StderrNotEmpty => !result.stderr.trim().is_empty(),
            FailureCheck::StdoutContains(marker) => result.stdout.contains(marker.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
    pub backoff: Backoff,
    pub failure_checks: Vec<FailureCheck>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// Same delay between every attempt. `max_attempts` is clamped to at least 1.
    pub fn fixed(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: Backoff::Fixed,
            failure_checks: vec![FailureCheck::NonZeroExit],
        }
    }

    pub fn exponential(max_attempts: usize, delay: Duration, max_delay: Duration) -> Self {
        Self {
            backoff: Backoff::Exponential { max_delay },
            ..Self::fixed(max_attempts, delay)
        }
    }

    /// A single attempt, no retry
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    #[must_use]
    pub fn with_check(mut self, check: FailureCheck) -> Self {
        if !self.failure_checks.contains(&check) {
            self.failure_checks.push(check);
        }
        self
    }

    pub fn is_failure(&self, result: &OperationResult) -> bool {
        self.failure_checks.iter().any(|check| check.fails(result))
    }

    /// Delays slept between attempts: `max_attempts - 1` entries
    pub fn delays(&self) -> Vec<Duration> {
        let retries = self.max_attempts.saturating_sub(1);
        match self.backoff {
            Backoff::Fixed => ConstantBuilder::default()
                .with_delay(self.delay)
                .with_max_times(retries)
                .build()
                .collect(),
            Backoff::Exponential { max_delay } => ExponentialBuilder::default()
                .with_min_delay(self.delay)
                .with_max_delay(max_delay.max(self.delay))
                .with_max_times(retries)
                .build()
                .collect(),
        }
    }
}

pub struct ResilientExecutor;

impl ResilientExecutor {
    /// Run `spec` through the context's runner under `policy`
    pub fn execute(ctx: &mut RunContext, spec: &CommandSpec, policy: &RetryPolicy) -> OperationResult {
        let runner = ctx.runner();
        Self::execute_with(ctx, &spec.to_string(), policy, || runner.run(spec))
    }

    /// Retry an arbitrary infallible operation
    pub fn execute_with(
        ctx: &mut RunContext,
        what: &str,
        policy: &RetryPolicy,
        mut operation: impl FnMut() -> OperationResult,
    ) -> OperationResult {
        let outcome: std::result::Result<OperationResult, Infallible> =
            Self::attempt_loop(ctx, what, policy, |_| Ok(operation()));
        match outcome {
            Ok(result) => result,
            Err(never) => match never {},
        }
    }

    /// Retry an operation that may fail hard (for example on operator cancellation)
    ///
    /// An `Err` from `operation` stops the loop at once and is returned unchanged.
    pub fn try_execute_with(
        ctx: &mut RunContext,
        what: &str,
        policy: &RetryPolicy,
        operation: impl FnMut(&mut RunContext) -> Result<OperationResult>,
    ) -> Result<OperationResult> {
        Self::attempt_loop(ctx, what, policy, operation)
    }

    fn attempt_loop<E>(
        ctx: &mut RunContext,
        what: &str,
        policy: &RetryPolicy,
        mut operation: impl FnMut(&mut RunContext) -> std::result::Result<OperationResult, E>,
    ) -> std::result::Result<OperationResult, E> {
        let max_attempts = policy.max_attempts.max(1);
        let mut delays = policy.delays().into_iter();
        let mut attempt = 1;

        loop {
            debug!(what, attempt, max_attempts, "running operation");
            let mut result = operation(ctx)?;
            result.success = !policy.is_failure(&result);
            if result.success {
                return Ok(result);
            }

            ctx.record_failure(what, &result);
            let summary = result.failure_summary();

            let next_delay = if attempt < max_attempts { delays.next() } else { None };
            let Some(delay) = next_delay else {
                warn!(what, attempts = attempt, %summary, "operation failed, no attempts left");
                return Ok(result);
            };

            warn!(what, attempt, max_attempts, %summary, ?delay, "operation failed, retrying");
            ctx.say(
                MessageLevel::Warning,
                &format!(
                    "Attempt {attempt}/{max_attempts} of `{what}` failed ({summary}); retrying in {}s",
                    delay.as_secs()
                ),
            );
            ctx.clock().sleep(delay);
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
        assert_eq!(
            policy.delays(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );
        assert!(RetryPolicy::once().delays().is_empty());
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy =
            RetryPolicy::exponential(5, Duration::from_secs(2), Duration::from_secs(5));
        let delays = policy.delays();
        assert_eq!(delays.len(), 4);
        assert_eq!(delays[0], Duration::from_secs(2));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(5)));
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn test_succeeds_on_last_attempt() {
        let harness = Harness::new();
        harness.runner.respond(
            "snap install",
            vec![
                OperationResult::failed(1, "snap not seeded"),
                OperationResult::failed(1, "snap not seeded"),
                OperationResult::succeeded("certbot installed"),
            ],
        );
        let mut ctx = harness.context();
        let spec = CommandSpec::new("snap").args(["install", "--classic", "certbot"]);

        let result = ResilientExecutor::execute(
            &mut ctx,
            &spec,
            &RetryPolicy::fixed(3, Duration::from_secs(5)),
        );

        assert!(result.success);
        assert_eq!(harness.runner.count("snap install"), 3);
        assert_eq!(
            harness.clock.sleeps(),
            vec![Duration::from_secs(5), Duration::from_secs(5)]
        );
    }

    #[test]
    fn test_exhausted_retries_return_final_result() {
        let harness = Harness::new();
        harness.runner.respond(
            "false",
            vec![
                OperationResult::failed(1, "first"),
                OperationResult::failed(2, "second"),
                OperationResult::failed(3, "last"),
            ],
        );
        let mut ctx = harness.context();

        let result = ResilientExecutor::execute(
            &mut ctx,
            &CommandSpec::new("false"),
            &RetryPolicy::fixed(3, Duration::from_secs(1)),
        );

        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "last");
        assert_eq!(harness.runner.count("false"), 3);
        // no sleep after the final attempt
        assert_eq!(harness.clock.sleeps().len(), 2);
        assert_eq!(ctx.recent_failures().count(), 3);
    }

    #[test]
    fn test_stdout_marker_counts_as_failure() {
        let harness = Harness::new();
        harness
            .runner
            .respond("certbot", vec![OperationResult::succeeded("Some challenges have failed")]);
        let mut ctx = harness.context();
        let policy = RetryPolicy::fixed(2, Duration::from_secs(1))
            .with_check(FailureCheck::StdoutContains("challenges have failed".to_string()));

        let result = ResilientExecutor::execute(&mut ctx, &CommandSpec::new("certbot"), &policy);

        assert!(!result.success);
        assert_eq!(harness.runner.count("certbot"), 2);
    }

    #[test]
    fn test_try_execute_stops_on_error() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        let mut calls = 0;

        let outcome = ResilientExecutor::try_execute_with(
            &mut ctx,
            "guarded",
            &RetryPolicy::fixed(3, Duration::from_secs(1)),
            |_| {
                calls += 1;
                Err(crate::error::DeployError::Cancelled {
                    step: "guarded".to_string(),
                })
            },
        );

        assert!(outcome.is_err());
        assert_eq!(calls, 1);
        assert!(harness.clock.sleeps().is_empty());
    }
}
