//! Lock/contention resolver
//!
//! Some subsystems cannot run while another agent holds a system-wide resource, the
//! package manager being the one that matters here. The resolver polls a
//! [`ContentionProbe`] until the resource is free, intervenes once on its own when the
//! blockers stop changing, and only then asks the operator.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::error::{DeployError, Result};
use crate::operator::ContentionChoice;
use crate::progress::MessageLevel;
use crate::runner::CommandRunner;

mod probe;

pub use probe::{LOCK_MARKERS, PackageLockProbe};

/// Blockers observed at one polling instant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentionSnapshot {
    pub markers: BTreeSet<PathBuf>,
    pub processes: BTreeSet<String>,
}

impl ContentionSnapshot {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.processes.is_empty()
    }

    pub fn marker_list(&self) -> String {
        join_or_none(self.markers.iter().map(|m| m.display().to_string()))
    }

    pub fn process_list(&self) -> String {
        join_or_none(self.processes.iter().cloned())
    }
}

impl fmt::Display for ContentionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processes: {}; locks: {}",
            self.process_list(),
            self.marker_list()
        )
    }
}

fn join_or_none(items: impl Iterator<Item = String>) -> String {
    let joined = items.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionMode {
    /// Terminate the snapshot's processes, then remove the snapshot's markers
    Automatic,
    /// Kill every matching process, remove every marker, repair the resource
    Forced,
}

/// What an intervention actually did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterventionReport {
    pub signalled: Vec<String>,
    pub removed: Vec<PathBuf>,
    pub notes: Vec<String>,
}

impl InterventionReport {
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if !self.signalled.is_empty() {
            parts.push(format!("stopped {}", self.signalled.join(", ")));
        }
        if !self.removed.is_empty() {
            let removed: Vec<_> = self.removed.iter().map(|p| p.display().to_string()).collect();
            parts.push(format!("removed {}", removed.join(", ")));
        }
        parts.extend(self.notes.iter().cloned());
        if parts.is_empty() {
            "nothing to do".to_string()
        } else {
            parts.join("; ")
        }
    }
}

/// Detects and clears blockers on one shared resource
pub trait ContentionProbe {
    /// Human-readable name, e.g. "package manager"
    fn resource(&self) -> &str;

    fn snapshot(&mut self, runner: &dyn CommandRunner) -> ContentionSnapshot;

    fn intervene(
        &mut self,
        runner: &dyn CommandRunner,
        snapshot: &ContentionSnapshot,
        mode: InterventionMode,
    ) -> InterventionReport;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub poll_interval: Duration,
    pub max_wait: Duration,
    /// Consecutive identical non-empty snapshots that count as stagnation
    pub stagnation_threshold: usize,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(600),
            stagnation_threshold: 6,
        }
    }
}

/// How a contention wait ended
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub waited: Duration,
    pub interventions: Vec<InterventionMode>,
}

pub struct LockResolver;

impl LockResolver {
    /// Wait until `probe` reports no blockers
    ///
    /// Fails with `LockTimeout` once `max_wait` has elapsed, or `Cancelled` when the
    /// operator confirms an abort.
    pub fn resolve(
        ctx: &mut RunContext,
        probe: &mut dyn ContentionProbe,
        settings: &LockSettings,
    ) -> Result<Resolution> {
        let outcome = Self::poll(ctx, probe, settings);
        if ctx.progress().is_waiting() {
            ctx.end_wait();
        }
        outcome
    }

    fn poll(
        ctx: &mut RunContext,
        probe: &mut dyn ContentionProbe,
        settings: &LockSettings,
    ) -> Result<Resolution> {
        let runner = ctx.runner();
        let start = ctx.clock().now();
        let threshold = settings.stagnation_threshold.max(1);
        let mut resolution = Resolution::default();
        let mut previous: Option<ContentionSnapshot> = None;
        let mut stagnant = 0usize;
        let mut checking_intervention = false;

        loop {
            let snapshot = probe.snapshot(runner.as_ref());
            resolution.waited = ctx.clock().elapsed_since(start);

            if snapshot.is_empty() {
                if !resolution.waited.is_zero() {
                    info!(resource = probe.resource(), waited = ?resolution.waited, "resource is free");
                }
                return Ok(resolution);
            }

            stagnant = match &previous {
                Some(prev) if *prev == snapshot => stagnant + 1,
                _ => 1,
            };
            debug!(resource = probe.resource(), %snapshot, stagnant, "resource is busy");

            if previous.is_none() {
                ctx.say(
                    MessageLevel::Detail,
                    &format!("The {} is busy ({snapshot})", probe.resource()),
                );
                ctx.begin_wait(&format!("Waiting for the {} to become free", probe.resource()));
            }
            previous = Some(snapshot.clone());

            let escalate = if checking_intervention {
                checking_intervention = false;
                true
            } else if stagnant >= threshold
                && !resolution.interventions.contains(&InterventionMode::Automatic)
            {
                warn!(resource = probe.resource(), %snapshot, "no progress, intervening");
                let report = probe.intervene(runner.as_ref(), &snapshot, InterventionMode::Automatic);
                resolution.interventions.push(InterventionMode::Automatic);
                ctx.say(
                    MessageLevel::Warning,
                    &format!(
                        "The {} made no progress; automatic recovery: {}",
                        probe.resource(),
                        report.summary()
                    ),
                );
                stagnant = 0;
                checking_intervention = true;
                false
            } else {
                stagnant >= threshold
            };

            if escalate {
                stagnant = 0;
                Self::ask_operator(ctx, probe, &snapshot, &mut resolution)?;
            }

            let elapsed = ctx.clock().elapsed_since(start);
            if elapsed >= settings.max_wait {
                return Err(DeployError::LockTimeout {
                    resource: probe.resource().to_string(),
                    waited_secs: elapsed.as_secs(),
                    markers: snapshot.marker_list(),
                    processes: snapshot.process_list(),
                });
            }
            ctx.clock()
                .sleep(settings.poll_interval.min(settings.max_wait - elapsed));
        }
    }

    fn ask_operator(
        ctx: &mut RunContext,
        probe: &mut dyn ContentionProbe,
        snapshot: &ContentionSnapshot,
        resolution: &mut Resolution,
    ) -> Result<()> {
        let resource = probe.resource().to_string();
        let blockers = snapshot.to_string();

        let choice = ctx.with_operator(|op| op.choose_contention(&resource, &blockers))?;
        info!(resource, ?choice, "operator chose contention handling");

        match choice {
            ContentionChoice::Wait => Ok(()),
            ContentionChoice::Force => {
                let question = format!(
                    "Kill all package-manager processes and delete every lock held on the {resource}?"
                );
                if !ctx.with_operator(|op| op.confirm(&question))? {
                    return Ok(());
                }
                let report = probe.intervene(ctx.runner().as_ref(), snapshot, InterventionMode::Forced);
                resolution.interventions.push(InterventionMode::Forced);
                ctx.say(
                    MessageLevel::Warning,
                    &format!("Forced recovery of the {resource}: {}", report.summary()),
                );
                Ok(())
            }
            ContentionChoice::Abort => {
                if !ctx.with_operator(|op| op.confirm("Abort the installation?"))? {
                    return Ok(());
                }
                ctx.cancel();
                Err(DeployError::Cancelled { step: resource })
            }
        }
    }
}
