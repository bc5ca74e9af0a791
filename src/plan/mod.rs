//! Step sequencer: drives an ordered plan to completion or to its first fatal failure
//!
//! Steps run strictly in order. The first failing step aborts the run; later steps are never
//! attempted and earlier steps are not rolled back, since every step is safe to repeat on a
//! later run (`--start-at`).

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info};

use crate::context::RunContext;
use crate::error::{DeployError, Result};

pub mod file;
pub mod ops;
mod step;

pub use file::PlanFile;
pub use ops::{Composite, HealthPolledWait, LockGuardedCall, ResilientCall, Task};
pub use step::{OperationCategory, Step, StepOperation, StepStatus};

/// Lines of diagnostics-command output kept in a failure report
const DIAGNOSTIC_TAIL: usize = 40;

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub total: usize,
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub elapsed: Duration,
}

/// One row of a plan listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutline {
    pub ordinal: usize,
    pub label: String,
    pub category: OperationCategory,
    pub detail: String,
    pub status: StepStatus,
}

pub struct Sequencer {
    steps: Vec<Step>,
}

impl Sequencer {
    pub fn new(steps: Vec<(String, Box<dyn StepOperation>)>) -> Self {
        Self {
            steps: steps
                .into_iter()
                .enumerate()
                .map(|(index, (label, operation))| Step::new(index + 1, label, operation))
                .collect(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn outline(&self) -> Vec<StepOutline> {
        self.steps
            .iter()
            .map(|step| StepOutline {
                ordinal: step.ordinal(),
                label: step.label().to_string(),
                category: step.operation().category(),
                detail: step.operation().describe(),
                status: step.status(),
            })
            .collect()
    }

    /// Mark every step before `ordinal` as skipped
    pub fn skip_before(&mut self, ordinal: usize) -> Result<()> {
        if ordinal == 0 || ordinal > self.steps.len() {
            return Err(DeployError::PlanInvalid {
                message: format!(
                    "cannot start at step {ordinal}; the plan has steps 1 to {}",
                    self.steps.len()
                ),
            });
        }
        for step in self.steps.iter_mut().take(ordinal - 1) {
            if step.status() == StepStatus::Pending {
                step.transition(StepStatus::Skipped)?;
            }
        }
        Ok(())
    }

    /// Labels of the steps that finished successfully so far
    pub fn completed(&self) -> Vec<(usize, &str)> {
        self.steps
            .iter()
            .filter(|s| s.status() == StepStatus::Succeeded)
            .map(|s| (s.ordinal(), s.label()))
            .collect()
    }

    pub fn run(&mut self, ctx: &mut RunContext) -> Result<RunReport> {
        let total = self.steps.len();
        let start = ctx.clock().now();

        for index in 0..total {
            if self.steps[index].status() != StepStatus::Pending {
                continue;
            }
            if ctx.is_cancelled() {
                ctx.progress().abandon();
                return Err(DeployError::Cancelled {
                    step: self.steps[index].label().to_string(),
                });
            }

            let step = &mut self.steps[index];
            let (ordinal, label) = (step.ordinal(), step.label().to_string());
            step.transition(StepStatus::Running)?;
            info!(ordinal, total, step = %label, "starting step");
            ctx.progress().begin_step(ordinal, total, &label);

            match step.operation.run(ctx) {
                Ok(()) => {
                    step.transition(StepStatus::Succeeded)?;
                    ctx.progress().finish_step(ordinal, true);
                    info!(ordinal, step = %label, "step succeeded");
                }
                Err(err) => {
                    step.transition(StepStatus::Failed)?;
                    ctx.progress().finish_step(ordinal, false);
                    ctx.progress().abandon();
                    error!(ordinal, step = %label, error = %err, "step failed");
                    return Err(Self::failure(ctx, step, err));
                }
            }
        }

        ctx.progress().finish();
        let labels = |status: StepStatus| -> Vec<String> {
            self.steps
                .iter()
                .filter(|s| s.status() == status)
                .map(|s| s.label().to_string())
                .collect()
        };
        Ok(RunReport {
            total,
            succeeded: labels(StepStatus::Succeeded),
            skipped: labels(StepStatus::Skipped),
            elapsed: ctx.clock().elapsed_since(start),
        })
    }

    fn failure(ctx: &mut RunContext, step: &Step, err: DeployError) -> DeployError {
        if err.is_cancelled() || ctx.is_cancelled() {
            return DeployError::Cancelled {
                step: step.label().to_string(),
            };
        }

        let mut diagnostics = Vec::new();
        if let Some(spec) = step.operation().diagnostics() {
            let result = ctx.run(spec);
            let output = result.combined_output();
            let lines: Vec<_> = output.lines().collect();
            diagnostics.push(format!("$ {spec}"));
            diagnostics.extend(
                lines[lines.len().saturating_sub(DIAGNOSTIC_TAIL)..]
                    .iter()
                    .map(|line| format!("  {line}")),
            );
            if lines.is_empty() {
                diagnostics.push(format!("  ({})", result.failure_summary()));
            }
        }
        diagnostics.extend(ctx.recent_failures().cloned());

        DeployError::StepFailed {
            ordinal: step.ordinal(),
            label: step.label().to_string(),
            reason: err.to_string(),
            diagnostics,
        }
    }
}
