//! Command helper utilities

use std::io::IsTerminal;
use std::sync::Arc;

use console::Style;

use crate::clock::SystemClock;
use crate::context::RunContext;
use crate::operator::{NonInteractiveOperator, Operator, TerminalOperator};
use crate::plan::{Sequencer, Step, StepStatus};
use crate::progress;
use crate::runner::SystemRunner;

/// Prompts are possible only when asked for and both stdin and stdout are terminals
pub fn is_interactive(non_interactive: bool) -> bool {
    !non_interactive && console::user_attended() && std::io::stdin().is_terminal()
}

/// Run context wired to the real host
pub fn host_context(interactive: bool) -> RunContext {
    let operator: Box<dyn Operator> = if interactive {
        Box::new(TerminalOperator)
    } else {
        Box::new(NonInteractiveOperator)
    };
    RunContext::new(
        Arc::new(SystemRunner),
        operator,
        Arc::new(SystemClock),
        progress::for_terminal(false),
    )
}

/// Lines telling the operator what finished and how to resume
pub fn resume_hint(sequencer: &Sequencer, command: &str) -> Vec<String> {
    let completed = sequencer.completed();
    let next = sequencer
        .steps()
        .iter()
        .find(|step| matches!(step.status(), StepStatus::Pending | StepStatus::Failed))
        .map(Step::ordinal);

    let mut lines = Vec::new();
    if completed.is_empty() {
        lines.push("No steps completed.".to_string());
    } else {
        lines.push("Completed steps:".to_string());
        lines.extend(
            completed
                .iter()
                .map(|(ordinal, label)| format!("  {ordinal}. {label}")),
        );
    }
    if let Some(next) = next {
        lines.push(format!("Resume with: {command} --start-at {next}"));
    }
    lines
}

pub fn print_resume_hint(sequencer: &Sequencer, command: &str) {
    let dim = Style::new().dim();
    eprintln!();
    for line in resume_hint(sequencer, command) {
        eprintln!("{}", dim.apply_to(line));
    }
    eprintln!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{StepOperation, Task};
    use crate::test_support::Harness;

    fn step(label: &str, fail: bool) -> (String, Box<dyn StepOperation>) {
        (
            label.to_string(),
            Box::new(Task::new(label, move |_| {
                if fail {
                    Err(crate::error::DeployError::PreflightFailed {
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(())
                }
            })),
        )
    }

    #[test]
    fn test_resume_hint_points_at_failed_step() {
        let harness = Harness::new();
        let mut ctx = harness.context();
        let mut sequencer = Sequencer::new(vec![
            step("One", false),
            step("Two", true),
            step("Three", false),
        ]);
        assert!(sequencer.run(&mut ctx).is_err());

        let hint = resume_hint(&sequencer, "homestead install");
        assert_eq!(
            hint,
            vec![
                "Completed steps:",
                "  1. One",
                "Resume with: homestead install --start-at 2"
            ]
        );
    }

    #[test]
    fn test_resume_hint_without_progress() {
        let sequencer = Sequencer::new(vec![step("One", false)]);
        let hint = resume_hint(&sequencer, "homestead run plan.yaml");
        assert_eq!(hint[0], "No steps completed.");
        assert_eq!(hint[1], "Resume with: homestead run plan.yaml --start-at 1");
    }
}
