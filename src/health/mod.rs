//! Health poller: bounded wait for an externally observable readiness condition
//!
//! The predicate is supplied by the caller, so the same loop serves container health,
//! account creation and public reachability. Halfway through the budget the troubleshooting
//! menu is opened once; after that the wait runs out the remaining time.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::Result;
use crate::runner::CommandSpec;
use crate::troubleshoot::{MenuOutcome, TroubleshootingMenu};

mod checks;

pub use checks::{
    AllOf, CommandSucceeds, ContainerRunning, HttpOk, ReadinessCheck, SucceedsOrAlreadyDone,
};

/// Parameters of one wait
#[derive(Debug, Clone)]
pub struct WaitSpec {
    /// What is being waited for, e.g. "service health"
    pub subject: String,
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Command whose output helps explain a stall
    pub diagnostics: Option<CommandSpec>,
}

impl WaitSpec {
    pub fn new(subject: impl Into<String>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            subject: subject.into(),
            timeout,
            poll_interval,
            diagnostics: None,
        }
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: CommandSpec) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

pub struct HealthPoller;

impl HealthPoller {
    pub fn wait_until(
        ctx: &mut RunContext,
        predicate: &mut dyn FnMut() -> bool,
        spec: &WaitSpec,
    ) -> Result<WaitOutcome> {
        ctx.begin_wait(&format!("Waiting for {}", spec.subject));
        let outcome = Self::poll(ctx, predicate, spec);
        ctx.end_wait();
        outcome
    }

    fn poll(
        ctx: &mut RunContext,
        predicate: &mut dyn FnMut() -> bool,
        spec: &WaitSpec,
    ) -> Result<WaitOutcome> {
        let start = ctx.clock().now();
        let midpoint = spec.timeout / 2;
        let mut escalated = false;
        let mut polls = 0u32;

        loop {
            polls += 1;
            if predicate() {
                info!(subject = %spec.subject, polls, elapsed = ?ctx.clock().elapsed_since(start), "ready");
                return Ok(WaitOutcome::Ready);
            }

            let mut elapsed = ctx.clock().elapsed_since(start);
            debug!(subject = %spec.subject, polls, ?elapsed, "not ready yet");

            if !escalated && elapsed >= midpoint && elapsed < spec.timeout {
                escalated = true;
                warn!(subject = %spec.subject, ?elapsed, "wait stalled, opening troubleshooting menu");
                let mut menu =
                    TroubleshootingMenu::new(spec.subject.clone(), spec.diagnostics.clone());
                if menu.run(ctx)? == MenuOutcome::Cancelled {
                    return Ok(WaitOutcome::Cancelled);
                }
                elapsed = ctx.clock().elapsed_since(start);
            }

            if elapsed >= spec.timeout {
                warn!(subject = %spec.subject, polls, ?elapsed, "gave up waiting");
                return Ok(WaitOutcome::TimedOut);
            }
            // Wake at the midpoint even when the interval would step over it
            let mut nap = spec.poll_interval.min(spec.timeout - elapsed);
            if !escalated && elapsed < midpoint {
                nap = nap.min(midpoint - elapsed);
            }
            ctx.clock().sleep(nap);
        }
    }
}
