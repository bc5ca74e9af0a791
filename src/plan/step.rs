//! Plan steps and their lifecycle

use std::fmt;

use serde::Serialize;

use crate::context::RunContext;
use crate::error::{DeployError, Result};
use crate::runner::CommandSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Left out because the run started at a later step
    Skipped,
}

impl StepStatus {
    fn can_become(self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running | StepStatus::Skipped)
                | (StepStatus::Running, StepStatus::Succeeded | StepStatus::Failed)
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(text)
    }
}

/// How a step reaches its goal; shown by `homestead plan`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationCategory {
    Resilient,
    LockGuarded,
    HealthPolled,
    Composite,
    Task,
}

impl fmt::Display for OperationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            OperationCategory::Resilient => "resilient",
            OperationCategory::LockGuarded => "lock-guarded",
            OperationCategory::HealthPolled => "health-polled",
            OperationCategory::Composite => "composite",
            OperationCategory::Task => "task",
        };
        f.write_str(text)
    }
}

/// The work behind one step
pub trait StepOperation {
    fn category(&self) -> OperationCategory;

    /// One-line description for plan listings
    fn describe(&self) -> String;

    fn run(&mut self, ctx: &mut RunContext) -> Result<()>;

    /// Command whose output explains a failure of this operation
    fn diagnostics(&self) -> Option<&CommandSpec> {
        None
    }
}

pub struct Step {
    ordinal: usize,
    label: String,
    status: StepStatus,
    pub(super) operation: Box<dyn StepOperation>,
}

impl Step {
    pub fn new(ordinal: usize, label: impl Into<String>, operation: Box<dyn StepOperation>) -> Self {
        Self {
            ordinal,
            label: label.into(),
            status: StepStatus::Pending,
            operation,
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> StepStatus {
        self.status
    }

    pub fn operation(&self) -> &dyn StepOperation {
        self.operation.as_ref()
    }

    /// Move to `next`; terminal steps never change again
    pub fn transition(&mut self, next: StepStatus) -> Result<()> {
        if !self.status.can_become(next) {
            return Err(DeployError::InvalidStepTransition {
                label: self.label.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("ordinal", &self.ordinal)
            .field("label", &self.label)
            .field("status", &self.status)
            .field("category", &self.operation.category())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ops::Task;

    fn step() -> Step {
        Step::new(1, "Preflight checks", Box::new(Task::new("noop", |_| Ok(()))))
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut step = step();
        step.transition(StepStatus::Running).unwrap();
        step.transition(StepStatus::Succeeded).unwrap();
        assert_eq!(step.status(), StepStatus::Succeeded);
    }

    #[test]
    fn test_terminal_steps_are_immutable() {
        let mut step = step();
        step.transition(StepStatus::Running).unwrap();
        step.transition(StepStatus::Failed).unwrap();

        for next in [StepStatus::Pending, StepStatus::Running, StepStatus::Succeeded] {
            let err = step.transition(next).unwrap_err();
            assert!(matches!(err, DeployError::InvalidStepTransition { .. }));
        }
        assert_eq!(step.status(), StepStatus::Failed);
    }

    #[test]
    fn test_pending_cannot_finish_directly() {
        let mut step = step();
        assert!(step.transition(StepStatus::Succeeded).is_err());
        step.transition(StepStatus::Skipped).unwrap();
        assert!(step.transition(StepStatus::Running).is_err());
    }
}
