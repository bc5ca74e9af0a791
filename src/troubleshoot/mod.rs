//! Troubleshooting recovery menu
//!
//! Entered when an automated wait stalls. The menu is an explicit state machine:
//! [`TroubleshootingMenu::advance`] performs one transition and
//! [`TroubleshootingMenu::run`] loops until a `Done` state, so repeated diagnostic views
//! never grow the stack.

use std::fmt;

use tracing::{info, warn};

use crate::context::RunContext;
use crate::error::Result;
use crate::operator::MenuChoice;
use crate::progress::MessageLevel;
use crate::runner::CommandSpec;

mod fixes;
mod guidance;

pub use fixes::{DEFAULT_INSTALL_DIR, FixCategory, RecoveryCatalog};

/// How the menu was left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    /// Resume the interrupted wait
    Continue,
    /// The operator confirmed cancelling the run
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuState {
    Prompt,
    Diagnostics,
    AutomaticFix,
    ManualGuidance,
    ConfirmCancel,
    Done(MenuOutcome),
}

impl fmt::Display for MenuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuState::Prompt => f.write_str("prompt"),
            MenuState::Diagnostics => f.write_str("diagnostics"),
            MenuState::AutomaticFix => f.write_str("automatic fix"),
            MenuState::ManualGuidance => f.write_str("manual guidance"),
            MenuState::ConfirmCancel => f.write_str("confirm cancel"),
            MenuState::Done(outcome) => write!(f, "done ({outcome:?})"),
        }
    }
}

/// Host checks shown with every diagnostics view
pub fn host_checks() -> Vec<(&'static str, CommandSpec)> {
    vec![
        ("Disk space", CommandSpec::new("df").args(["-h", "/"])),
        ("Memory", CommandSpec::new("free").arg("-m")),
        (
            "Failed services",
            CommandSpec::new("systemctl").args(["--failed", "--no-pager"]),
        ),
        ("Containers", CommandSpec::new("docker").args(["ps", "-a"])),
    ]
}

/// What is stalling and where the menu currently is
#[derive(Debug, Clone)]
pub struct TroubleshootingContext {
    pub subject: String,
    pub diagnostics: Option<CommandSpec>,
    pub state: MenuState,
}

pub struct TroubleshootingMenu {
    context: TroubleshootingContext,
}

impl TroubleshootingMenu {
    pub fn new(subject: impl Into<String>, diagnostics: Option<CommandSpec>) -> Self {
        Self {
            context: TroubleshootingContext {
                subject: subject.into(),
                diagnostics,
                state: MenuState::Prompt,
            },
        }
    }

    /// Start somewhere other than the prompt, e.g. straight at the diagnostics view
    #[must_use]
    pub fn starting_at(mut self, state: MenuState) -> Self {
        self.context.state = state;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> MenuState {
        self.context.state
    }

    #[cfg(test)]
    pub fn context(&self) -> &TroubleshootingContext {
        &self.context
    }

    /// Loop until the operator continues or cancels
    pub fn run(&mut self, ctx: &mut RunContext) -> Result<MenuOutcome> {
        loop {
            if let MenuState::Done(outcome) = self.advance(ctx)? {
                info!(subject = %self.context.subject, ?outcome, "troubleshooting menu closed");
                return Ok(outcome);
            }
        }
    }

    /// Perform one transition and return the new state
    pub fn advance(&mut self, ctx: &mut RunContext) -> Result<MenuState> {
        let next = match self.context.state {
            MenuState::Prompt => self.prompt(ctx)?,
            MenuState::Diagnostics => {
                self.show_diagnostics(ctx)?;
                MenuState::Prompt
            }
            MenuState::AutomaticFix => self.attempt_fix(ctx)?,
            MenuState::ManualGuidance => {
                let text = ctx.recovery().guidance_for(&self.context.subject);
                let title = format!("Manual intervention: {}", self.context.subject);
                ctx.with_operator(|op| op.show(&title, &text));
                MenuState::Prompt
            }
            MenuState::ConfirmCancel => {
                if ctx.with_operator(|op| {
                    op.confirm("Cancel the installation? Completed steps stay in place.")
                })? {
                    ctx.cancel();
                    MenuState::Done(MenuOutcome::Cancelled)
                } else {
                    MenuState::Prompt
                }
            }
            done @ MenuState::Done(_) => done,
        };
        self.context.state = next;
        Ok(next)
    }

    fn prompt(&self, ctx: &mut RunContext) -> Result<MenuState> {
        let subject = &self.context.subject;
        let choice = ctx.with_operator(|op| op.choose_recovery(subject))?;
        info!(subject = %subject, ?choice, "troubleshooting choice");
        Ok(match choice {
            MenuChoice::Continue => MenuState::Done(MenuOutcome::Continue),
            MenuChoice::ShowDiagnostics => MenuState::Diagnostics,
            MenuChoice::AutomaticFix => MenuState::AutomaticFix,
            MenuChoice::ManualGuidance => MenuState::ManualGuidance,
            MenuChoice::Cancel => MenuState::ConfirmCancel,
        })
    }

    fn show_diagnostics(&self, ctx: &mut RunContext) -> Result<()> {
        let mut sections = Vec::new();
        let mut commands: Vec<(String, CommandSpec)> = Vec::new();
        if let Some(diagnostics) = &self.context.diagnostics {
            commands.push((self.context.subject.clone(), diagnostics.clone()));
        }
        commands.extend(
            host_checks()
                .into_iter()
                .map(|(title, spec)| (title.to_string(), spec)),
        );

        for (title, spec) in commands {
            let result = ctx.run(&spec);
            let output = result.combined_output();
            let body = if output.is_empty() && !result.success {
                result.failure_summary()
            } else {
                output
            };
            sections.push(format!("── {title} ({spec})\n{body}"));
        }

        let failures: Vec<_> = ctx.recent_failures().cloned().collect();
        if !failures.is_empty() {
            sections.push(format!("── Recent failures\n{}", failures.join("\n")));
        }

        let title = format!("Diagnostics: {}", self.context.subject);
        let body = sections.join("\n\n");
        ctx.with_operator(|op| op.show(&title, &body));
        Ok(())
    }

    fn attempt_fix(&self, ctx: &mut RunContext) -> Result<MenuState> {
        let subject = &self.context.subject;
        let Some(category) = FixCategory::classify(subject) else {
            ctx.say(
                MessageLevel::Warning,
                &format!("No automatic fix is known for {subject}"),
            );
            return Ok(MenuState::Prompt);
        };
        let routine = ctx.recovery().routine(category).to_vec();
        if routine.is_empty() {
            ctx.say(
                MessageLevel::Warning,
                &format!("No automatic fix is configured for the {category}"),
            );
            return Ok(MenuState::Prompt);
        }

        let destructive: Vec<_> = routine
            .iter()
            .filter(|a| a.destructive)
            .map(|a| format!("  - {}: {}", a.description, a.command))
            .collect();
        if !destructive.is_empty() {
            let question = format!(
                "The {category} fix will run:\n{}\nProceed?",
                destructive.join("\n")
            );
            if !ctx.with_operator(|op| op.confirm(&question))? {
                info!(%category, "automatic fix declined");
                return Ok(MenuState::Prompt);
            }
        }

        ctx.say(
            MessageLevel::Info,
            &format!("Attempting automatic fix for the {category}"),
        );
        for action in &routine {
            let result = ctx.run(&action.command);
            if result.success {
                ctx.say(MessageLevel::Detail, &action.description);
                continue;
            }
            ctx.record_failure(&action.description, &result);
            if action.required {
                warn!(%category, action = %action.description, summary = %result.failure_summary(), "fix action failed");
                ctx.say(
                    MessageLevel::Error,
                    &format!(
                        "{} failed: {}",
                        action.description,
                        result.failure_summary()
                    ),
                );
                return Ok(MenuState::Prompt);
            }
            ctx.say(
                MessageLevel::Warning,
                &format!("{} failed (ignored)", action.description),
            );
        }

        ctx.say(
            MessageLevel::Info,
            &format!("Automatic fix for the {category} completed"),
        );
        Ok(MenuState::Done(MenuOutcome::Continue))
    }
}
