//! Run context shared by the sequencer and every component it calls
//!
//! One `RunContext` is created per run and passed by `&mut` down the call chain. It owns
//! the operator, the progress reporter, and the recent-failure log, and hands out the
//! command runner and clock. Nothing here is global, so tests inject fakes for all of it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::clock::Clock;
use crate::operator::Operator;
use crate::progress::{MessageLevel, ProgressReporter};
use crate::runner::{CommandRunner, CommandSpec, OperationResult};
use crate::troubleshoot::RecoveryCatalog;

const DIAGNOSTIC_LOG_CAPACITY: usize = 20;

pub struct RunContext {
    runner: Arc<dyn CommandRunner>,
    operator: Box<dyn Operator>,
    clock: Arc<dyn Clock>,
    progress: Box<dyn ProgressReporter>,
    recovery: RecoveryCatalog,
    recent_failures: VecDeque<String>,
    wait_message: Option<String>,
    cancelled: bool,
}

impl RunContext {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        operator: Box<dyn Operator>,
        clock: Arc<dyn Clock>,
        progress: Box<dyn ProgressReporter>,
    ) -> Self {
        Self {
            runner,
            operator,
            clock,
            progress,
            recovery: RecoveryCatalog::default(),
            recent_failures: VecDeque::with_capacity(DIAGNOSTIC_LOG_CAPACITY),
            wait_message: None,
            cancelled: false,
        }
    }

    /// Replace the fix routines and guidance used by the troubleshooting menu
    #[must_use]
    pub fn with_recovery(mut self, recovery: RecoveryCatalog) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    pub fn run(&self, spec: &CommandSpec) -> OperationResult {
        self.runner.run(spec)
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn recovery(&self) -> &RecoveryCatalog {
        &self.recovery
    }

    pub fn progress(&mut self) -> &mut dyn ProgressReporter {
        self.progress.as_mut()
    }

    /// Print an operator-facing status line
    pub fn say(&mut self, level: MessageLevel, text: &str) {
        self.progress.message(level, text);
    }

    /// Start the busy indicator for a blocking wait
    pub fn begin_wait(&mut self, message: &str) {
        self.wait_message = Some(message.to_string());
        self.progress.begin_wait(message);
    }

    pub fn end_wait(&mut self) {
        self.wait_message = None;
        self.progress.end_wait();
    }

    /// Hand the terminal to the operator
    ///
    /// The busy indicator is stopped and joined before `f` runs and restarted afterwards if
    /// a wait was in progress.
    pub fn with_operator<T>(&mut self, f: impl FnOnce(&mut dyn Operator) -> T) -> T {
        let resume = self.wait_message.clone();
        if self.progress.is_waiting() {
            self.progress.end_wait();
        }
        let value = f(self.operator.as_mut());
        if let Some(message) = resume {
            self.progress.begin_wait(&message);
        }
        value
    }

    /// Remember a failed operation for the fatal-error report
    pub fn record_failure(&mut self, what: &str, result: &OperationResult) {
        if self.recent_failures.len() == DIAGNOSTIC_LOG_CAPACITY {
            self.recent_failures.pop_front();
        }
        self.recent_failures
            .push_back(format!("{what}: {}", result.failure_summary()));
    }

    pub fn recent_failures(&self) -> impl Iterator<Item = &String> {
        self.recent_failures.iter()
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
